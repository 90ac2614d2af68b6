use std::time::Duration;

use chrono::Local;
use log::{info, warn};
use rand::rngs::ThreadRng;
use serde_json::json;
use smithay_client_toolkit::shell::{WaylandSurface, wlr_layer::LayerSurface};
use wayland_client::{QueueHandle, protocol::wl_output::WlOutput, protocol::wl_shm::Format};

use crate::canvas::{Align, Canvas, Placement};
use crate::cli::{Launch, MonitorTarget};
use crate::color::process_color;
use crate::command::{Command, Response};
use crate::config::{Config, PositionMode, PositionPreset, Style};
use crate::overlay::{Mode, Overlay};
use crate::render;
use crate::sampler::ScreenSampler;
use crate::wayland::Wayland;

/// Animation tick periods: 20 Hz for the lightbulb glow, a deliberately
/// cheap 3 Hz for the deadline horror effects.
pub const LIGHTBULB_TICK: Duration = Duration::from_millis(50);
pub const DEADLINE_TICK: Duration = Duration::from_millis(333);
/// Alarm animation runs at 10 Hz while an alarm is ramping or decaying.
pub const ALARM_TICK: Duration = Duration::from_millis(100);

/// Contrast floor handed to the color processor for sampled screen colors.
const SAMPLED_MIN_CONTRAST: f64 = 3.0;

const FALLBACK_SCREEN: (u32, u32) = (1920, 1080);

/// One overlay surface bound to one monitor: the state machine plus its
/// rasterizer and layer surface.
pub struct Pane {
    pub overlay: Overlay,
    pub layer: LayerSurface,
    pub canvas: Canvas,
    configured: bool,
}

/// The application context: owns the configuration, the ordered pane list
/// (insertion order = monitor order), the screen sampler, and the command
/// dispatch the control channel broadcasts through. Constructed once and
/// threaded through the event loop; nothing here is global.
pub struct App {
    pub wl: Wayland,
    pub config: Config,
    launch: Launch,
    panes: Vec<Pane>,
    sampler: Option<ScreenSampler>,
    screen_size: Option<(u32, u32)>,
    outputs_seen: usize,
    rng: ThreadRng,

    redraw_requested: bool,
    alarm_timer_needed: bool,
    alarm_timer_running: bool,
    sampler_timer_requested: bool,
}

impl App {
    pub fn new(wl: Wayland, config: Config, launch: Launch) -> Self {
        let sampler = config
            .screen_sampling
            .enabled
            .then(|| ScreenSampler::new(&config.screen_sampling));

        Self {
            wl,
            config,
            launch,
            panes: Vec::new(),
            sampler,
            screen_size: None,
            outputs_seen: 0,
            rng: rand::thread_rng(),
            redraw_requested: false,
            alarm_timer_needed: false,
            alarm_timer_running: false,
            sampler_timer_requested: false,
        }
    }

    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    // ===== output / surface lifecycle =====

    /// Called for every announced output, in announcement order; creates a
    /// pane when the launch targets this monitor.
    pub fn output_added(&mut self, qh: &QueueHandle<Self>, output: WlOutput) {
        let index = self.outputs_seen;
        self.outputs_seen += 1;

        if self.screen_size.is_none() {
            self.screen_size = self
                .wl
                .output_state
                .info(&output)
                .and_then(|info| info.logical_size)
                .map(|(w, h)| (w.max(1) as u32, h.max(1) as u32));
        }

        let wanted = match self.launch.monitors {
            MonitorTarget::All => true,
            MonitorTarget::Index(target) => target == index,
        };
        if !wanted {
            return;
        }

        match self
            .wl
            .create_overlay_surface(qh, Some(&output), &self.config)
        {
            Ok(layer) => {
                info!("overlay pane created on output {index}");
                self.panes.push(Pane {
                    overlay: Overlay::new(
                        self.launch.mode,
                        self.launch.duration_seconds,
                        Local::now(),
                    ),
                    layer,
                    canvas: Canvas::new(0, 0),
                    configured: false,
                });
            }
            Err(e) => warn!("could not create overlay on output {index}: {e:#}"),
        }
    }

    /// Layer-surface configure: adopt the compositor-assigned size.
    pub fn surface_configured(&mut self, layer: &LayerSurface, width: u32, height: u32) {
        if let Some(pane) = self
            .panes
            .iter_mut()
            .find(|p| p.layer.wl_surface() == layer.wl_surface())
        {
            pane.canvas.resize(width as i32, height as i32);
            pane.configured = true;
            self.redraw_requested = true;
        }
    }

    /// Compositor closed one of our surfaces; when the last pane goes, the
    /// host exits.
    pub fn surface_closed(&mut self, layer: &LayerSurface) {
        self.panes.retain(|p| p.layer.wl_surface() != layer.wl_surface());
        if self.panes.is_empty() {
            self.wl.exit = true;
        }
    }

    // ===== timers =====

    /// 1 Hz: advance displayed time and flash phase.
    pub fn tick_second(&mut self) {
        for pane in &mut self.panes {
            pane.overlay.tick_second();
        }
        self.redraw_requested = true;
    }

    /// The mode/style-dependent animation cadence; None means only the
    /// second tick runs.
    pub fn animation_interval(&self) -> Option<Duration> {
        if self.config.style == Style::Lightbulb {
            Some(LIGHTBULB_TICK)
        } else if self.panes.iter().any(|p| p.overlay.mode == Mode::Deadline)
            || (self.panes.is_empty() && self.launch.mode == Mode::Deadline)
        {
            Some(DEADLINE_TICK)
        } else {
            None
        }
    }

    pub fn tick_animation(&mut self) {
        for pane in &mut self.panes {
            pane.overlay.tick_animation();
        }
        self.redraw_requested = true;
    }

    /// 10 Hz alarm tick; returns false once every pane has fully decayed,
    /// which drops the timer.
    pub fn tick_alarm(&mut self) -> bool {
        let mut any_alive = false;
        for pane in &mut self.panes {
            any_alive |= pane.overlay.tick_alarm(&mut self.rng);
        }
        self.redraw_requested = true;
        any_alive
    }

    /// One-shot: should the host insert the alarm timer now?
    pub fn should_start_alarm_timer(&mut self) -> bool {
        if self.alarm_timer_needed && !self.alarm_timer_running {
            self.alarm_timer_needed = false;
            self.alarm_timer_running = true;
            true
        } else {
            self.alarm_timer_needed = false;
            false
        }
    }

    pub fn alarm_timer_stopped(&mut self) {
        self.alarm_timer_running = false;
    }

    /// One-shot: should the host (re)insert the sampler timer now?
    pub fn should_start_sampler_timer(&mut self) -> bool {
        std::mem::take(&mut self.sampler_timer_requested)
    }

    pub fn sampler_interval(&self) -> Option<Duration> {
        self.sampler.as_ref().map(|s| s.update_interval())
    }

    pub fn sampler_enabled(&self) -> bool {
        self.sampler.as_ref().is_some_and(|s| s.enabled())
    }

    /// Sampler tick: capture, throttle, and on a reported change derive the
    /// new overlay color. Returns false once sampling is disabled, which
    /// drops the timer.
    pub fn tick_sampler(&mut self) -> bool {
        let (width, height) = self.screen_size.unwrap_or(FALLBACK_SCREEN);
        let Some(sampler) = self.sampler.as_mut() else {
            return false;
        };
        if !sampler.enabled() {
            return false;
        }

        if let Some(mean) = sampler.sample(width, height) {
            let derived = process_color(mean, self.config.background_color, SAMPLED_MIN_CONTRAST);
            info!("screen sample {mean} -> overlay color {derived}");
            self.config.color = derived;
            self.redraw_requested = true;
        }
        true
    }

    // ===== rendering =====

    fn placement(&self) -> Placement {
        match self.config.position_mode {
            PositionMode::Preset => Placement {
                horizontal: Align::Center,
                vertical: match self.config.position_preset {
                    PositionPreset::Top => Align::Start,
                    PositionPreset::Center => Align::Center,
                    PositionPreset::Bottom => Align::End,
                },
            },
            // Custom offsets ride on the layer margins; the text hugs the
            // offset corner and centers on any unset axis.
            PositionMode::Custom => Placement {
                horizontal: if self.config.position_x.is_some() {
                    Align::Start
                } else {
                    Align::Center
                },
                vertical: if self.config.position_y.is_some() {
                    Align::Start
                } else {
                    Align::Center
                },
            },
        }
    }

    /// Render and present every configured pane.
    pub fn draw_all(&mut self) {
        let now = Local::now();
        let placement = self.placement();

        for i in 0..self.panes.len() {
            if !self.panes[i].configured {
                continue;
            }

            let text = self.panes[i].overlay.display_text(now);
            if self.panes[i].overlay.mode == Mode::Deadline {
                let remaining = self.panes[i].overlay.remaining_seconds(now);
                self.panes[i].overlay.note_deadline_second(remaining);
            }
            self.alarm_timer_needed |= self.panes[i].overlay.take_alarm_timer_request();

            let plan = render::build_frame(
                &self.panes[i].overlay,
                &self.config,
                text,
                now,
                &mut self.rng,
            );

            let pane = &mut self.panes[i];
            pane.canvas.render(&plan, placement);

            let (width, height) = pane.canvas.size();
            if width <= 0 || height <= 0 {
                continue;
            }
            match self
                .wl
                .pool
                .create_buffer(width, height, width * 4, Format::Argb8888)
            {
                Ok((buffer, slice)) => {
                    slice.copy_from_slice(pane.canvas.data());
                    let surface = pane.layer.wl_surface();
                    surface.damage_buffer(0, 0, width, height);
                    match buffer.attach_to(surface) {
                        Ok(()) => pane.layer.commit(),
                        Err(e) => warn!("buffer attach failed: {e}"),
                    }
                }
                Err(e) => warn!("buffer allocation failed: {e}"),
            }
        }
    }

    // ===== control channel =====

    /// Resolve one control-channel command. Mutating commands broadcast over
    /// every pane and answer with the last pane's result, matching the wire
    /// contract callers already depend on.
    pub fn handle_command(&mut self, command: Command) -> Response {
        match command {
            Command::Status => self.cmd_status(),
            Command::ReloadConfig => self.cmd_reload_config(),
            Command::ForbiddenAlarm(args) => self.broadcast(|overlay| {
                overlay.trigger_alarm(&args.window_class, &args.window_title, &args.message);
                json!({"success": true, "message": "Alarm activated"})
            }),
            Command::DismissAlarm => self.broadcast(|overlay| {
                overlay.dismiss_alarm();
                json!({"success": true, "message": "Alarm dismissed"})
            }),
            Command::ResetDeadline => self.broadcast(|overlay| {
                if overlay.reset_deadline() {
                    json!({"success": true, "message": "Reset to clock mode"})
                } else {
                    json!({"success": false, "message": "Not in deadline mode"})
                }
            }),
            Command::ToggleScreenSampling => self.cmd_toggle_sampling(),
        }
    }

    fn broadcast<F>(&mut self, f: F) -> Response
    where
        F: FnMut(&mut Overlay) -> serde_json::Value,
    {
        let response = broadcast(self.panes.iter_mut().map(|p| &mut p.overlay), f);
        for pane in &mut self.panes {
            self.alarm_timer_needed |= pane.overlay.take_alarm_timer_request();
        }
        self.redraw_requested = true;
        response
    }

    fn cmd_status(&self) -> Response {
        let mode = self
            .panes
            .first()
            .map(|p| p.overlay.mode)
            .unwrap_or(self.launch.mode);
        Response::Payload(status_payload(mode, &self.config))
    }

    /// Rebuild the configuration from defaults + file. CLI overrides are
    /// not re-applied; reload replaces the merged record wholesale.
    fn cmd_reload_config(&mut self) -> Response {
        if self.panes.is_empty() {
            return Response::Payload(
                json!({"status": "error", "message": "No instances available"}).to_string(),
            );
        }

        self.config = Config::load();
        if let Some(sampler) = self.sampler.as_mut() {
            if sampler.enabled() != self.config.screen_sampling.enabled
                && sampler.toggle()
            {
                self.sampler_timer_requested = true;
            }
        }
        self.redraw_requested = true;

        Response::Payload(
            json!({
                "status": "success",
                "message": "Config reloaded. Restart overlay to apply position changes.",
            })
            .to_string(),
        )
    }

    fn cmd_toggle_sampling(&mut self) -> Response {
        let Some(sampler) = self.sampler.as_mut() else {
            return Response::Payload(
                json!({"success": false, "message": "Screen color monitor not initialized"})
                    .to_string(),
            );
        };

        let enabled = sampler.toggle();
        if enabled {
            self.sampler_timer_requested = true;
        }

        Response::Payload(
            json!({
                "success": true,
                "enabled": enabled,
                "message": format!(
                    "Screen sampling {}",
                    if enabled { "enabled" } else { "disabled" }
                ),
            })
            .to_string(),
        )
    }
}

/// Apply `f` to every overlay in announcement order; the reply carries the
/// last overlay's result, or a generic failure when none exist. Individual
/// failures stay inside the payload, the response itself is still `OK:`.
fn broadcast<'a, I, F>(overlays: I, mut f: F) -> Response
where
    I: Iterator<Item = &'a mut Overlay>,
    F: FnMut(&mut Overlay) -> serde_json::Value,
{
    let mut last = None;
    for overlay in overlays {
        last = Some(f(overlay));
    }

    match last {
        Some(value) => Response::Payload(value.to_string()),
        None => Response::Payload(
            json!({"success": false, "message": "No instances available"}).to_string(),
        ),
    }
}

fn status_payload(mode: Mode, config: &Config) -> String {
    let position_mode = match config.position_mode {
        PositionMode::Preset => "preset",
        PositionMode::Custom => "custom",
    };
    let position_preset = match config.position_preset {
        PositionPreset::Top => "top",
        PositionPreset::Center => "center",
        PositionPreset::Bottom => "bottom",
    };

    json!({
        "status": "running",
        "mode": mode,
        "config": {
            "color": config.color.to_string(),
            "font_size": config.font_size,
            "opacity": config.opacity,
            "style": config.style_name(),
            "position_mode": position_mode,
            "position_preset": position_preset,
        },
    })
    .to_string()
}
