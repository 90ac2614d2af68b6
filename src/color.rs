use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An sRGB color with 8-bit channels, serialized as a `#rrggbb` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const WHITE: Rgb = Rgb::new(255, 255, 255);
pub const BLACK: Rgb = Rgb::new(0, 0, 0);

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to [0, 1], the form every rendering path consumes.
    pub fn to_f32(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }

    /// Relative luminance with ITU-R BT.709 weights on /255 channel values.
    /// Channels are not gamma-linearized; contrast ratios must use the same
    /// convention on both sides to stay comparable.
    pub fn luminance(self) -> f64 {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        0.2126 * r + 0.7152 * g + 0.0722 * b
    }

    /// WCAG contrast ratio, (lighter + 0.05) / (darker + 0.05).
    pub fn contrast_ratio(self, other: Rgb) -> f64 {
        let l1 = self.luminance();
        let l2 = other.luminance();
        (l1.max(l2) + 0.05) / (l1.min(l2) + 0.05)
    }

    /// Euclidean distance in RGB space, used by the sampler throttle.
    pub fn distance(self, other: Rgb) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 {
            anyhow::bail!("invalid hex color '{s}': expected #rrggbb");
        }
        let r = u8::from_str_radix(&hex[0..2], 16)?;
        let g = u8::from_str_radix(&hex[2..4], 16)?;
        let b = u8::from_str_radix(&hex[4..6], 16)?;
        Ok(Self { r, g, b })
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hue/saturation/value, all in [0, 1].
fn rgb_to_hsv(rgb: Rgb) -> (f64, f64, f64) {
    let [r, g, b] = rgb.to_f32().map(|c| c as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        (((g - b) / delta).rem_euclid(6.0)) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h.floor() as u32 % 6;
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb::new(
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

/// Derive a legible overlay color from a sampled screen color.
///
/// Takes the complementary hue of the sample, pushes value/saturation bright
/// on dark screens and dark on bright screens, then enforces a WCAG contrast
/// floor against the sample; falls back to pure white (dark screen) or pure
/// black (bright screen) when the candidate misses the floor.
///
/// `background` is accepted for call-site compatibility but deliberately
/// unused: contrast is always measured against the sampled color, not the
/// configured background.
pub fn process_color(sampled: Rgb, background: Rgb, min_contrast_ratio: f64) -> Rgb {
    let _ = background;

    let screen_luminance = sampled.luminance();
    let (h, s, _v) = rgb_to_hsv(sampled);
    let h_comp = (h + 0.5).rem_euclid(1.0);

    // Dark screen wants a bright vibrant color, bright screen a dark one.
    let (v_target, s_target) = if screen_luminance < 0.5 {
        (0.95, s.max(0.6))
    } else {
        (0.3, s.max(0.7))
    };

    let candidate = hsv_to_rgb(h_comp, s_target, v_target);

    if candidate.contrast_ratio(sampled) < min_contrast_ratio {
        if screen_luminance < 0.5 { WHITE } else { BLACK }
    } else {
        candidate
    }
}
