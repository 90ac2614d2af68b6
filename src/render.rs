use chrono::{DateTime, Local};
use rand::Rng;

use crate::color::Rgb;
use crate::config::{Config, Style};
use crate::overlay::{Mode, Overlay};

/// Premultiplied-nothing RGBA in [0, 1]; the canvas clamps on blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb(rgb: Rgb, a: f32) -> Self {
        let [r, g, b] = rgb.to_f32();
        Self { r, g, b, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassKind {
    Fill,
    Stroke { width: f32 },
}

/// One glyph-layer draw of the time string, offset from its base position.
#[derive(Debug, Clone, Copy)]
pub struct TextPass {
    pub dx: f32,
    pub dy: f32,
    pub color: Rgba,
    pub kind: PassKind,
}

/// An expanding alarm wave, centered on the surface.
#[derive(Debug, Clone, Copy)]
pub struct Ring {
    pub radius: f32,
    pub width: f32,
    pub color: Rgba,
}

/// Secondary message line drawn below the clock during an alarm.
#[derive(Debug, Clone)]
pub struct MessageBlock {
    pub text: String,
    pub font_size: f32,
    pub passes: Vec<TextPass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphWeight {
    /// Thin wire filaments for the lightbulb style.
    Thin,
    Bold,
}

/// Everything the rasterizer needs for one frame. The pass list is the
/// animation contract: layer counts, jitter ranges, and opacities are what
/// re-implementations must reproduce; pixels are not.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub text: String,
    pub font_size: f32,
    pub weight: GlyphWeight,
    pub rings: Vec<Ring>,
    pub passes: Vec<TextPass>,
    pub message: Option<MessageBlock>,
}

/// Urgency step function of seconds remaining; drives deadline intensity.
pub fn urgency(remaining_seconds: i64) -> f32 {
    if remaining_seconds > 300 {
        0.5
    } else if remaining_seconds > 60 {
        0.7
    } else if remaining_seconds > 10 {
        0.9
    } else {
        1.0
    }
}

/// Derive the draw passes for one frame from the overlay state and config.
pub fn build_frame(
    overlay: &Overlay,
    config: &Config,
    text: String,
    now: DateTime<Local>,
    rng: &mut impl Rng,
) -> FramePlan {
    // Flash overrides the configured color with pure red on alternate ticks.
    let base = if overlay.is_flashing && overlay.flash_state {
        Rgb::new(255, 0, 0)
    } else {
        config.color
    };

    if overlay.alarm.active && overlay.alarm.intensity > 0.05 {
        plan_alarm(overlay, config, text, rng)
    } else if overlay.mode == Mode::Deadline && config.style != Style::Normal {
        plan_deadline(overlay, config, text, base, now, rng)
    } else {
        match config.style {
            Style::Lightbulb => plan_lightbulb(overlay, config, text, rng),
            Style::Bordered => plan_bordered(config, text, base),
            Style::Normal => plan_normal(config, text, base),
        }
    }
}

fn plan_normal(config: &Config, text: String, base: Rgb) -> FramePlan {
    FramePlan {
        text,
        font_size: config.font_size,
        weight: GlyphWeight::Bold,
        rings: Vec::new(),
        passes: vec![TextPass {
            dx: 0.0,
            dy: 0.0,
            color: Rgba::from_rgb(base, config.opacity),
            kind: PassKind::Fill,
        }],
        message: None,
    }
}

fn plan_bordered(config: &Config, text: String, base: Rgb) -> FramePlan {
    FramePlan {
        text,
        font_size: config.font_size,
        weight: GlyphWeight::Bold,
        rings: Vec::new(),
        passes: vec![
            TextPass {
                dx: 0.0,
                dy: 0.0,
                color: Rgba::new(0.0, 0.0, 0.0, 1.0),
                kind: PassKind::Stroke { width: 1.8 },
            },
            TextPass {
                dx: 0.0,
                dy: 0.0,
                color: Rgba::from_rgb(base, config.opacity),
                kind: PassKind::Fill,
            },
        ],
        message: None,
    }
}

/// Stochastic additive glow: many faint jittered thin strokes plus a few
/// brighter core strokes, pulsing on a slow sine with a random shimmer.
fn plan_lightbulb(
    overlay: &Overlay,
    config: &Config,
    text: String,
    rng: &mut impl Rng,
) -> FramePlan {
    let base_pulse = 0.85 + 0.15 * (overlay.animation_frame as f32 * 0.08).sin();
    let shimmer = 1.0 + (rng.gen_range(0.0..1.0f32) - 0.5) * 0.1;
    let glow = base_pulse * shimmer;

    let mut passes = Vec::with_capacity(19);

    for _ in 0..15 {
        passes.push(TextPass {
            dx: rng.gen_range(-1.2..=1.2),
            dy: rng.gen_range(-1.2..=1.2),
            color: Rgba::new(
                rng.gen_range(0.85..=0.98),
                rng.gen_range(0.92..=1.0),
                1.0,
                rng.gen_range(0.08..=0.15) * glow,
            ),
            kind: PassKind::Stroke {
                width: rng.gen_range(0.3..=0.8),
            },
        });
    }

    for _ in 0..4 {
        passes.push(TextPass {
            dx: rng.gen_range(-0.5..=0.5),
            dy: rng.gen_range(-0.5..=0.5),
            color: Rgba::new(0.95, 0.98, 1.0, rng.gen_range(0.2..=0.3) * glow),
            kind: PassKind::Stroke {
                width: rng.gen_range(0.4..=0.7),
            },
        });
    }

    FramePlan {
        text,
        font_size: config.font_size,
        weight: GlyphWeight::Thin,
        rings: Vec::new(),
        passes,
        message: None,
    }
}

fn plan_deadline(
    overlay: &Overlay,
    config: &Config,
    text: String,
    base: Rgb,
    now: DateTime<Local>,
    rng: &mut impl Rng,
) -> FramePlan {
    let remaining = overlay.remaining_seconds(now);
    let urgency = urgency(remaining);

    let pulse_speed = 0.08 * (1.0 + urgency);
    let pulse = 0.7 + 0.3 * (overlay.deadline.pulse_frame as f32 * pulse_speed).sin();

    let tick_intensity = if overlay.deadline.tick_state {
        0.3 * urgency
    } else {
        0.0
    };

    let flicker = if rng.gen_range(0.0..1.0f32) < 0.1 * urgency {
        rng.gen_range(0.7..=1.0)
    } else {
        1.0
    };

    // Dim toward 0.55x at low urgency, full brightness near the end.
    let scale = if urgency < 0.7 {
        0.55
    } else if urgency < 0.9 {
        0.8
    } else {
        1.0
    };
    let [br, bg, bb] = base.to_f32();
    let (r, g, b) = (br * scale, bg * scale, bb * scale);

    let mut passes = Vec::new();

    let glow_layers = ((4.0 * urgency) as usize).max(2);
    for _ in 0..glow_layers {
        passes.push(TextPass {
            dx: rng.gen_range(-2.5..=2.5),
            dy: rng.gen_range(-2.5..=2.5),
            color: Rgba::new(
                r,
                g * 0.2,
                b,
                rng.gen_range(0.3..=0.6) * pulse * flicker * urgency,
            ),
            kind: PassKind::Stroke {
                width: rng.gen_range(0.4..=1.0),
            },
        });
    }

    passes.push(TextPass {
        dx: 0.0,
        dy: 0.0,
        color: Rgba::new(
            r,
            g,
            b,
            config.opacity * pulse * flicker * (1.0 + tick_intensity),
        ),
        kind: PassKind::Fill,
    });

    if urgency > 0.5 || tick_intensity > 0.0 {
        let center_layers =
            (5.0 * urgency) as usize + if tick_intensity > 0.0 { 3 } else { 0 };
        for _ in 0..center_layers {
            let mut alpha = rng.gen_range(0.15..=0.35) * pulse * urgency;
            if tick_intensity > 0.0 {
                alpha *= 1.8;
            }
            // A touch of orange for a fiery look in the final stretch.
            let bright_g = if urgency > 0.8 { g + 0.3 * urgency } else { g };
            passes.push(TextPass {
                dx: rng.gen_range(-0.8..=0.8),
                dy: rng.gen_range(-0.8..=0.8),
                color: Rgba::new(r, bright_g, b, alpha),
                kind: PassKind::Stroke {
                    width: rng.gen_range(0.3..=0.7),
                },
            });
        }
    }

    FramePlan {
        text,
        font_size: config.font_size,
        weight: GlyphWeight::Bold,
        rings: Vec::new(),
        passes,
        message: None,
    }
}

/// The forbidden-alarm overlay: expanding wave rings, heavy red glow, a
/// solid red core with white-hot strokes, and the message line once the
/// intensity has ramped past half.
fn plan_alarm(
    overlay: &Overlay,
    config: &Config,
    text: String,
    rng: &mut impl Rng,
) -> FramePlan {
    let intensity = overlay.alarm.intensity;
    let (shake_x, shake_y) = overlay.alarm.shake_offset;
    let (shake_x, shake_y) = (shake_x as f32, shake_y as f32);

    let mut rings = Vec::with_capacity(3);
    for i in 0..3u32 {
        let radius = ((overlay.alarm.wave_offset + i * 60) % 200 + 50) as f32;
        rings.push(Ring {
            radius,
            width: 3.0,
            color: Rgba::new(1.0, 0.0, 0.0, (1.0 - radius / 250.0) * intensity * 0.3),
        });
    }

    let pulse = 0.7 + 0.3 * (overlay.animation_frame as f32 * 0.2).sin();
    let glow = pulse * intensity;

    let mut passes = Vec::with_capacity(16);

    for _ in 0..12 {
        passes.push(TextPass {
            dx: shake_x + rng.gen_range(-3.0..=3.0),
            dy: shake_y + rng.gen_range(-3.0..=3.0),
            color: Rgba::new(1.0, rng.gen_range(0.0..=0.1), 0.0, rng.gen_range(0.2..=0.5) * glow),
            kind: PassKind::Stroke {
                width: rng.gen_range(0.5..=1.5),
            },
        });
    }

    passes.push(TextPass {
        dx: shake_x,
        dy: shake_y,
        color: Rgba::new(1.0, 0.0, 0.0, 0.95 * intensity),
        kind: PassKind::Fill,
    });

    for _ in 0..3 {
        passes.push(TextPass {
            dx: shake_x + rng.gen_range(-0.5..=0.5),
            dy: shake_y + rng.gen_range(-0.5..=0.5),
            color: Rgba::new(1.0, 1.0, 1.0, rng.gen_range(0.3..=0.5) * glow),
            kind: PassKind::Stroke { width: 0.3 },
        });
    }

    let message = if !overlay.alarm.message.is_empty() && intensity > 0.5 {
        let msg_pulse = 0.8 + 0.2 * (overlay.animation_frame as f32 * 0.15).sin();
        let mut msg_passes = Vec::with_capacity(6);
        for _ in 0..5 {
            msg_passes.push(TextPass {
                dx: rng.gen_range(-2.0..=2.0),
                dy: rng.gen_range(-2.0..=2.0),
                color: Rgba::new(1.0, 0.0, 0.0, rng.gen_range(0.1..=0.2) * msg_pulse),
                kind: PassKind::Fill,
            });
        }
        msg_passes.push(TextPass {
            dx: 0.0,
            dy: 0.0,
            color: Rgba::new(1.0, 0.0, 0.0, 0.95 * msg_pulse),
            kind: PassKind::Fill,
        });
        Some(MessageBlock {
            text: overlay.alarm.message.clone(),
            font_size: 24.0,
            passes: msg_passes,
        })
    } else {
        None
    };

    FramePlan {
        text,
        font_size: config.font_size,
        weight: GlyphWeight::Bold,
        rings,
        passes,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn clock(config_style: Style) -> (Overlay, Config) {
        let config = Config {
            style: config_style,
            ..Config::default()
        };
        (Overlay::new(Mode::Clock, None, Local::now()), config)
    }

    fn frame(overlay: &Overlay, config: &Config) -> FramePlan {
        build_frame(
            overlay,
            config,
            "12:34:56".into(),
            Local::now(),
            &mut rng(),
        )
    }

    #[test]
    fn urgency_steps() {
        assert_eq!(urgency(400), 0.5);
        assert_eq!(urgency(301), 0.5);
        assert_eq!(urgency(300), 0.7);
        assert_eq!(urgency(61), 0.7);
        assert_eq!(urgency(60), 0.9);
        assert_eq!(urgency(11), 0.9);
        assert_eq!(urgency(10), 1.0);
        assert_eq!(urgency(0), 1.0);
    }

    #[test]
    fn normal_style_is_single_fill() {
        let (overlay, config) = clock(Style::Normal);
        let plan = frame(&overlay, &config);
        assert_eq!(plan.passes.len(), 1);
        assert_eq!(plan.passes[0].kind, PassKind::Fill);
        assert_eq!(plan.passes[0].color.a, config.opacity);
        assert!(plan.rings.is_empty());
        assert!(plan.message.is_none());
    }

    #[test]
    fn flash_phase_turns_text_red() {
        let (mut overlay, config) = clock(Style::Normal);
        overlay.is_flashing = true;
        overlay.flash_state = true;
        let plan = frame(&overlay, &config);
        let c = plan.passes[0].color;
        assert_eq!((c.r, c.g, c.b), (1.0, 0.0, 0.0));

        overlay.flash_state = false;
        let plan = frame(&overlay, &config);
        let c = plan.passes[0].color;
        assert_ne!((c.r, c.g, c.b), (1.0, 0.0, 0.0));
    }

    #[test]
    fn bordered_is_opaque_black_outline_then_fill() {
        let (overlay, config) = clock(Style::Bordered);
        let plan = frame(&overlay, &config);
        assert_eq!(plan.passes.len(), 2);
        assert_eq!(plan.passes[0].kind, PassKind::Stroke { width: 1.8 });
        assert_eq!(plan.passes[0].color, Rgba::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(plan.passes[1].kind, PassKind::Fill);
    }

    #[test]
    fn lightbulb_layer_counts_and_ranges() {
        let (overlay, config) = clock(Style::Lightbulb);
        let plan = frame(&overlay, &config);
        assert_eq!(plan.passes.len(), 15 + 4);
        assert_eq!(plan.weight, GlyphWeight::Thin);

        for pass in &plan.passes {
            assert!(pass.dx.abs() <= 1.2 && pass.dy.abs() <= 1.2);
            let PassKind::Stroke { width } = pass.kind else {
                panic!("lightbulb draws strokes only");
            };
            assert!((0.3..=0.8).contains(&width));
            // Shimmer can push glow slightly above 1.0.
            assert!(pass.color.a > 0.0 && pass.color.a <= 0.32);
            assert_eq!(pass.color.b, 1.0);
        }
    }

    #[test]
    fn deadline_layer_counts_scale_with_urgency() {
        let now = Local::now();
        let config = Config {
            style: Style::Lightbulb,
            ..Config::default()
        };

        // Far out: minimum glow, no bright center (urgency 0.5, no tick).
        let far = Overlay::new(Mode::Deadline, Some(3600), now);
        let plan = build_frame(&far, &config, "01:00:00".into(), now, &mut rng());
        let strokes = plan
            .passes
            .iter()
            .filter(|p| matches!(p.kind, PassKind::Stroke { .. }))
            .count();
        assert_eq!(strokes, 2);
        let fills = plan.passes.len() - strokes;
        assert_eq!(fills, 1);

        // Final seconds: 4 glow + fill + 5 bright center.
        let near = Overlay::new(Mode::Deadline, Some(5), now);
        let plan = build_frame(&near, &config, "00:00:05".into(), now, &mut rng());
        assert_eq!(plan.passes.len(), 4 + 1 + 5);
    }

    #[test]
    fn deadline_tick_flash_adds_layers_and_opacity() {
        let now = Local::now();
        let config = Config {
            style: Style::Bordered,
            opacity: 0.35,
            ..Config::default()
        };
        let mut overlay = Overlay::new(Mode::Deadline, Some(5), now);
        overlay.note_deadline_second(overlay.remaining_seconds(now));
        assert!(overlay.deadline.tick_state);

        let plan = build_frame(&overlay, &config, "00:00:05".into(), now, &mut rng());
        // 4 glow + fill + (5 + 3 tick-flash extra) center strokes.
        assert_eq!(plan.passes.len(), 4 + 1 + 8);

        let fill = plan
            .passes
            .iter()
            .find(|p| p.kind == PassKind::Fill)
            .unwrap();
        // Fill opacity carries the +30% tick boost (pulse/flicker <= 1).
        assert!(fill.color.a <= 0.35 * 1.3 + 1e-6);
    }

    #[test]
    fn deadline_with_normal_style_stays_plain() {
        let now = Local::now();
        let (_, config) = clock(Style::Normal);
        let overlay = Overlay::new(Mode::Deadline, Some(60), now);
        let plan = build_frame(&overlay, &config, "00:01:00".into(), now, &mut rng());
        assert_eq!(plan.passes.len(), 1);
        assert_eq!(plan.passes[0].kind, PassKind::Fill);
    }

    #[test]
    fn alarm_overrides_other_styles() {
        let (mut overlay, config) = clock(Style::Lightbulb);
        overlay.trigger_alarm("", "", "no");
        overlay.alarm.intensity = 1.0;
        let plan = frame(&overlay, &config);

        assert_eq!(plan.rings.len(), 3);
        for ring in &plan.rings {
            assert!((50.0..250.0).contains(&ring.radius));
            assert!(ring.color.a >= 0.0 && ring.color.a <= 0.3);
        }

        // 12 glow strokes + red fill + 3 hot-center strokes.
        assert_eq!(plan.passes.len(), 16);
        let fills: Vec<_> = plan
            .passes
            .iter()
            .filter(|p| p.kind == PassKind::Fill)
            .collect();
        assert_eq!(fills.len(), 1);
        assert_eq!(
            (fills[0].color.r, fills[0].color.g, fills[0].color.b),
            (1.0, 0.0, 0.0)
        );
        assert!((fills[0].color.a - 0.95).abs() < 1e-6);
    }

    #[test]
    fn alarm_below_intensity_threshold_renders_base_style() {
        let (mut overlay, config) = clock(Style::Normal);
        overlay.trigger_alarm("", "", "no");
        overlay.alarm.intensity = 0.04;
        let plan = frame(&overlay, &config);
        assert!(plan.rings.is_empty());
        assert_eq!(plan.passes.len(), 1);
    }

    #[test]
    fn alarm_message_appears_past_half_intensity() {
        let (mut overlay, config) = clock(Style::Normal);
        overlay.trigger_alarm("", "", "This window is forbidden!");

        overlay.alarm.intensity = 0.4;
        assert!(frame(&overlay, &config).message.is_none());

        overlay.alarm.intensity = 0.9;
        let message = frame(&overlay, &config).message.expect("message block");
        assert_eq!(message.text, "This window is forbidden!");
        assert_eq!(message.font_size, 24.0);
        // 5 glow layers + the main line.
        assert_eq!(message.passes.len(), 6);
    }

    #[test]
    fn alarm_jitter_includes_shake_offset() {
        let (mut overlay, config) = clock(Style::Normal);
        overlay.trigger_alarm("", "", "no");
        overlay.alarm.intensity = 1.0;
        overlay.alarm.shake_offset = (3, -2);
        let plan = frame(&overlay, &config);
        for pass in &plan.passes {
            assert!((pass.dx - 3.0).abs() <= 3.0);
            assert!((pass.dy + 2.0).abs() <= 3.0);
        }
    }

    #[test]
    fn expired_deadline_escalates_into_alarm_plan() {
        let now = Local::now();
        let config = Config {
            style: Style::Bordered,
            ..Config::default()
        };
        let mut overlay = Overlay::new(Mode::Deadline, Some(1), now);
        let text = overlay.display_text(now + Duration::seconds(2));
        assert_eq!(text, "00:00:00");

        // Ramp a few alarm ticks, then the alarm plan takes over.
        let mut r = rng();
        for _ in 0..3 {
            overlay.tick_alarm(&mut r);
        }
        let plan = build_frame(&overlay, &config, text, now, &mut rng());
        assert_eq!(plan.rings.len(), 3);
    }
}
