use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache, Weight};

use crate::render::{FramePlan, GlyphWeight, PassKind, Rgba, Ring, TextPass};

/// Vertical gap between the clock and the alarm message line.
const MESSAGE_GAP: f32 = 30.0;

/// Offsets approximating a stroked outline as a ring of glyph-mask stamps.
const OUTLINE_DIRS: [(f32, f32); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (0.7071, 0.7071),
    (0.7071, -0.7071),
    (-0.7071, 0.7071),
    (-0.7071, -0.7071),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Start,
    Center,
    End,
}

/// Where the time string sits on the surface; derived from position config.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub horizontal: Align,
    pub vertical: Align,
}

/// Software rasterizer for one overlay pane: a premultiplied BGRA pixel
/// buffer the shm slot pool copies from, plus the cosmic-text machinery for
/// glyph masks. All animation decisions live in the frame plan; this only
/// stamps what it is told.
pub struct Canvas {
    width: i32,
    height: i32,
    pixel_data: Vec<u8>,
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl Canvas {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            pixel_data: vec![0u8; (width * height * 4).max(0) as usize],
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
        }
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
        self.pixel_data = vec![0u8; (width * height * 4).max(0) as usize];
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.pixel_data
    }

    pub fn render(&mut self, plan: &FramePlan, placement: Placement) {
        self.pixel_data.fill(0);

        for ring in &plan.rings {
            self.draw_ring(ring);
        }

        let weight = match plan.weight {
            GlyphWeight::Thin => Weight::THIN,
            GlyphWeight::Bold => Weight::BOLD,
        };

        let buffer = self.shape(&plan.text, plan.font_size, weight);
        let (text_w, text_h) = Self::measure(&buffer, plan.font_size);
        let x = Self::aligned(placement.horizontal, self.width as f32, text_w);
        let y = Self::aligned(placement.vertical, self.height as f32, text_h);

        for pass in &plan.passes {
            self.draw_pass(&buffer, x, y, pass);
        }

        if let Some(message) = &plan.message {
            let msg_buffer = self.shape(&message.text, message.font_size, Weight::BOLD);
            let (msg_w, _) = Self::measure(&msg_buffer, message.font_size);
            let msg_x = ((self.width as f32 - msg_w) / 2.0).max(0.0);
            let msg_y = y + text_h + MESSAGE_GAP;
            for pass in &message.passes {
                self.draw_pass(&msg_buffer, msg_x, msg_y, pass);
            }
        }
    }

    fn aligned(align: Align, available: f32, content: f32) -> f32 {
        match align {
            Align::Start => 0.0,
            Align::Center => ((available - content) / 2.0).max(0.0),
            Align::End => (available - content).max(0.0),
        }
    }

    fn shape(&mut self, text: &str, font_size: f32, weight: Weight) -> Buffer {
        let metrics = Metrics::new(font_size, font_size * 1.2);
        let mut buffer = Buffer::new(&mut self.font_system, metrics);
        buffer.set_size(
            &mut self.font_system,
            Some(self.width as f32),
            Some(self.height as f32),
        );
        buffer.set_text(
            &mut self.font_system,
            text,
            Attrs::new().family(Family::Monospace).weight(weight),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }

    fn measure(buffer: &Buffer, font_size: f32) -> (f32, f32) {
        let width = buffer.layout_runs().next().map_or(0.0, |run| run.line_w);
        let height = Metrics::new(font_size, font_size * 1.2).line_height;
        (width, height)
    }

    /// Stamp one glyph-mask layer. Strokes are approximated on the mask: a
    /// ring of stamps at the stroke radius for widths >= 1px, a single
    /// alpha-scaled stamp for the sub-pixel glow strokes.
    fn draw_pass(&mut self, buffer: &Buffer, x: f32, y: f32, pass: &TextPass) {
        let px = x + pass.dx;
        let py = y + pass.dy;
        match pass.kind {
            PassKind::Fill => self.stamp(buffer, px, py, pass.color, 1.0),
            PassKind::Stroke { width } => {
                if width >= 1.0 {
                    let radius = width / 2.0;
                    for (ox, oy) in OUTLINE_DIRS {
                        self.stamp(buffer, px + ox * radius, py + oy * radius, pass.color, 1.0);
                    }
                } else {
                    self.stamp(buffer, px, py, pass.color, width);
                }
            }
        }
    }

    fn stamp(&mut self, buffer: &Buffer, x: f32, y: f32, color: Rgba, coverage_scale: f32) {
        let alpha = (color.a * coverage_scale).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }

        let (ix, iy) = (x.round() as i32, y.round() as i32);
        let width = self.width;
        let height = self.height;
        let pixel_data = &mut self.pixel_data;

        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            Color::rgba(255, 255, 255, 255),
            |gx, gy, _w, _h, glyph_color| {
                let px = ix + gx;
                let py = iy + gy;
                if px < 0 || px >= width || py < 0 || py >= height {
                    return;
                }
                let mask = glyph_color.a() as f32 / 255.0;
                if mask <= 0.0 {
                    return;
                }
                let mut layer = color;
                layer.a = alpha;
                Self::blend(pixel_data, Self::pixel_idx(width, px, py), layer, mask);
            },
        );
    }

    fn draw_ring(&mut self, ring: &Ring) {
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let half = ring.width / 2.0;
        let outer = ring.radius + half + 1.0;
        let inner = (ring.radius - half - 1.0).max(0.0);

        let y0 = ((cy - outer).floor() as i32).max(0);
        let y1 = ((cy + outer).ceil() as i32).min(self.height - 1);
        let x0 = ((cx - outer).floor() as i32).max(0);
        let x1 = ((cx + outer).ceil() as i32).min(self.width - 1);

        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < inner || dist > outer {
                    continue;
                }
                // Full coverage inside the band, one-pixel fade at the edge.
                let edge = (dist - ring.radius).abs();
                let falloff = if edge <= half {
                    1.0
                } else {
                    (1.0 - (edge - half)).max(0.0)
                };
                if falloff > 0.0 {
                    Self::blend(
                        &mut self.pixel_data,
                        Self::pixel_idx(self.width, px, py),
                        ring.color,
                        falloff,
                    );
                }
            }
        }
    }

    #[inline]
    fn pixel_idx(width: i32, x: i32, y: i32) -> usize {
        ((y * width + x) * 4) as usize
    }

    /// Premultiplied source-over into the BGRA buffer; wl_shm Argb8888
    /// expects premultiplied alpha.
    fn blend(pixel_data: &mut [u8], idx: usize, color: Rgba, coverage: f32) {
        if idx + 3 >= pixel_data.len() {
            return;
        }

        let a = (color.a.clamp(0.0, 1.0) * coverage.clamp(0.0, 1.0)).clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let inv = 1.0 - a;

        let blend_channel = |dst: u8, src: f32| -> u8 {
            (src.clamp(0.0, 1.0) * a * 255.0 + dst as f32 * inv).round() as u8
        };

        pixel_data[idx] = blend_channel(pixel_data[idx], color.b);
        pixel_data[idx + 1] = blend_channel(pixel_data[idx + 1], color.g);
        pixel_data[idx + 2] = blend_channel(pixel_data[idx + 2], color.r);
        pixel_data[idx + 3] = (a * 255.0 + pixel_data[idx + 3] as f32 * inv).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(canvas: &Canvas, x: i32, y: i32) -> [u8; 4] {
        let idx = Canvas::pixel_idx(canvas.width, x, y);
        canvas.pixel_data[idx..idx + 4].try_into().unwrap()
    }

    #[test]
    fn ring_paints_band_and_leaves_center_clear() {
        let mut canvas = Canvas::new(200, 200);
        canvas.draw_ring(&Ring {
            radius: 50.0,
            width: 3.0,
            color: Rgba::new(1.0, 0.0, 0.0, 0.5),
        });

        // On the ring, to the right of center: red in BGRA order.
        let on = at(&canvas, 150, 100);
        assert_eq!(on[0], 0); // blue
        assert!(on[2] > 0); // red
        assert!(on[3] > 0);

        // Center and far corner stay transparent.
        assert_eq!(at(&canvas, 100, 100), [0, 0, 0, 0]);
        assert_eq!(at(&canvas, 5, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn blend_is_premultiplied_source_over() {
        let mut data = vec![0u8; 4];
        Canvas::blend(&mut data, 0, Rgba::new(1.0, 0.0, 0.0, 1.0), 1.0);
        assert_eq!(&data[..], &[0, 0, 255, 255]);

        // Half-coverage white over the red: channels move toward white,
        // alpha stays saturated.
        Canvas::blend(&mut data, 0, Rgba::new(1.0, 1.0, 1.0, 1.0), 0.5);
        assert_eq!(data[3], 255);
        assert!(data[0] > 100 && data[1] > 100);
    }

    #[test]
    fn blend_ignores_out_of_bounds_index() {
        let mut data = vec![0u8; 4];
        Canvas::blend(&mut data, 4, Rgba::new(1.0, 1.0, 1.0, 1.0), 1.0);
        assert_eq!(&data[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn render_shapes_text_through_full_plan() {
        // Exercises the shaping path (set_text/shape/draw) end to end;
        // glyph coverage depends on installed fonts, so only the buffer
        // contract is asserted, not pixels.
        let mut canvas = Canvas::new(128, 64);
        let plan = FramePlan {
            text: "12:34:56".into(),
            font_size: 20.0,
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
                    color: Rgba::new(1.0, 1.0, 1.0, 0.5),
                    kind: PassKind::Fill,
                },
            ],
            message: Some(crate::render::MessageBlock {
                text: "This window is forbidden!".into(),
                font_size: 12.0,
                passes: vec![TextPass {
                    dx: 0.0,
                    dy: 0.0,
                    color: Rgba::new(1.0, 0.0, 0.0, 0.9),
                    kind: PassKind::Fill,
                }],
            }),
        };

        canvas.render(&plan, Placement {
            horizontal: Align::Center,
            vertical: Align::Center,
        });
        assert_eq!(canvas.data().len(), 128 * 64 * 4);

        // A second render clears the previous frame before drawing.
        canvas.render(&plan, Placement {
            horizontal: Align::Start,
            vertical: Align::Start,
        });
        assert_eq!(canvas.size(), (128, 64));
    }

    #[test]
    fn alignment_math() {
        assert_eq!(Canvas::aligned(Align::Start, 100.0, 30.0), 0.0);
        assert_eq!(Canvas::aligned(Align::Center, 100.0, 30.0), 35.0);
        assert_eq!(Canvas::aligned(Align::End, 100.0, 30.0), 70.0);
        // Oversized content clamps to the origin instead of going negative.
        assert_eq!(Canvas::aligned(Align::Center, 100.0, 300.0), 0.0);
    }
}
