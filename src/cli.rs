use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::color::Rgb;
use crate::config::{PositionPreset, Style};
use crate::overlay::Mode;

/// Transparent, click-through time/countdown overlay for wlroots compositors.
#[derive(Debug, Parser)]
#[command(name = "intime", version, about)]
pub struct Cli {
    /// Display mode
    #[arg(long, value_enum, default_value_t = Mode::Clock)]
    pub mode: Mode,

    /// Countdown duration, e.g. 30m, 1h, 1h30m45s
    #[arg(long)]
    pub duration: Option<String>,

    /// Text color in hex (e.g. #ff0000); also disables screen sampling
    #[arg(long)]
    pub color: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    pub font_size: Option<f32>,

    /// Text opacity, 0.0 to 1.0
    #[arg(long)]
    pub opacity: Option<f32>,

    /// Position preset
    #[arg(long, value_enum, conflicts_with_all = ["position_x", "position_y"])]
    pub position: Option<PositionPreset>,

    /// Custom X position in pixels
    #[arg(long)]
    pub position_x: Option<i32>,

    /// Custom Y position in pixels
    #[arg(long)]
    pub position_y: Option<i32>,

    /// Monitor index to display on (0 = first)
    #[arg(long, conflicts_with = "all_monitors")]
    pub monitor: Option<usize>,

    /// Display the overlay on every connected monitor
    #[arg(long)]
    pub all_monitors: bool,

    /// Visual style
    #[arg(long, value_enum)]
    pub style: Option<Style>,
}

/// Which monitors get an overlay pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTarget {
    /// The Nth output, in announcement order.
    Index(usize),
    All,
}

/// Validated launch parameters, derived from the raw CLI before any surface
/// exists. Construction failures are fatal startup errors.
#[derive(Debug)]
pub struct Launch {
    pub mode: Mode,
    pub duration_seconds: Option<u64>,
    pub monitors: MonitorTarget,
    pub overrides: Overrides,
}

/// CLI-level config overrides, the top precedence layer.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub color: Option<Rgb>,
    pub font_size: Option<f32>,
    pub opacity: Option<f32>,
    pub style: Option<Style>,
    pub position_preset: Option<PositionPreset>,
    pub position_x: Option<i32>,
    pub position_y: Option<i32>,
}

impl Cli {
    pub fn into_launch(self) -> Result<Launch> {
        let duration_seconds = match (self.mode, &self.duration) {
            (Mode::Countdown | Mode::Deadline, Some(spec)) => Some(
                parse_duration(spec)
                    .with_context(|| format!("invalid --duration '{spec}'"))?,
            ),
            (Mode::Countdown | Mode::Deadline, None) => {
                bail!("--duration is required for countdown and deadline modes")
            }
            _ => None,
        };

        if let Some(opacity) = self.opacity
            && !(0.0..=1.0).contains(&opacity)
        {
            bail!("--opacity must be within 0.0..=1.0");
        }

        let color = self
            .color
            .as_deref()
            .map(|s| s.parse::<Rgb>())
            .transpose()?;

        let monitors = match self.monitor {
            _ if self.all_monitors => MonitorTarget::All,
            Some(index) => MonitorTarget::Index(index),
            None => MonitorTarget::Index(0),
        };

        Ok(Launch {
            mode: self.mode,
            duration_seconds,
            monitors,
            overrides: Overrides {
                color,
                font_size: self.font_size,
                opacity: self.opacity,
                style: self.style,
                position_preset: self.position,
                position_x: self.position_x,
                position_y: self.position_y,
            },
        })
    }
}

/// Parse a duration like "30m", "1h", "1h30m45s" into whole seconds.
///
/// Each of the h/m/s components is optional but they must appear in that
/// order, and the total must be nonzero.
pub fn parse_duration(spec: &str) -> Result<u64> {
    let spec = spec.trim();
    if spec.is_empty() {
        bail!("empty duration");
    }

    let mut hours = 0u64;
    let mut minutes = 0u64;
    let mut seconds = 0u64;
    let mut rest = spec;

    for (unit, slot) in [
        ('h', &mut hours),
        ('m', &mut minutes),
        ('s', &mut seconds),
    ] {
        if let Some(pos) = rest.find(unit) {
            let digits = &rest[..pos];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                bail!("malformed component '{digits}{unit}'");
            }
            *slot = digits.parse()?;
            rest = &rest[pos + 1..];
        }
    }

    if !rest.is_empty() {
        bail!("trailing input '{rest}' (use a form like 1h30m45s)");
    }
    if hours == 0 && minutes == 0 && seconds == 0 {
        bail!("duration must be greater than zero");
    }

    Ok(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_components_sum() {
        assert_eq!(parse_duration("30m").unwrap(), 30 * 60);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert_eq!(parse_duration("45s").unwrap(), 45);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration("2h5m7s").unwrap(), 2 * 3600 + 5 * 60 + 7);
    }

    #[test]
    fn duration_rejects_zero_and_garbage() {
        assert!(parse_duration("0h0m0s").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten minutes").is_err());
        assert!(parse_duration("5m3h").is_err()); // out of order
        assert!(parse_duration("1h2x").is_err());
    }

    #[test]
    fn countdown_requires_duration() {
        let cli = Cli::parse_from(["intime", "--mode", "countdown"]);
        assert!(cli.into_launch().is_err());
    }

    #[test]
    fn clock_mode_needs_nothing() {
        let launch = Cli::parse_from(["intime"]).into_launch().unwrap();
        assert_eq!(launch.mode, Mode::Clock);
        assert_eq!(launch.duration_seconds, None);
        assert_eq!(launch.monitors, MonitorTarget::Index(0));
    }

    #[test]
    fn position_preset_conflicts_with_coordinates() {
        assert!(
            Cli::try_parse_from(["intime", "--position", "top", "--position-x", "10"]).is_err()
        );
    }

    #[test]
    fn monitor_conflicts_with_all_monitors() {
        assert!(Cli::try_parse_from(["intime", "--monitor", "1", "--all-monitors"]).is_err());
    }

    #[test]
    fn color_override_parses_hex() {
        let launch = Cli::parse_from(["intime", "--color", "#00ff00"])
            .into_launch()
            .unwrap();
        assert_eq!(launch.overrides.color, Some(Rgb::new(0, 255, 0)));
    }

    #[test]
    fn bad_color_is_fatal() {
        assert!(
            Cli::parse_from(["intime", "--color", "#fff"])
                .into_launch()
                .is_err()
        );
    }
}
