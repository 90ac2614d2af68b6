use std::fs;
use std::path::PathBuf;

use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cli::Overrides;
use crate::color::Rgb;

/// Bundled fallback, used when no user config exists.
const EXAMPLE_CONFIG: &str = include_str!("../config/config.example.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Normal,
    Lightbulb,
    Bordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PositionMode {
    Preset,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PositionPreset {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSampling {
    pub enabled: bool,
    /// Seconds between samples.
    pub update_interval: f64,
    /// Minimum RGB Euclidean distance before a new sample is reported.
    pub throttle_threshold: f64,
}

impl Default for ScreenSampling {
    fn default() -> Self {
        Self {
            enabled: false,
            update_interval: 0.5,
            throttle_threshold: 15.0,
        }
    }
}

/// The merged overlay configuration. Defaults are overlaid by the user config
/// file, which is overlaid by CLI flags; the result is read wholesale each
/// render and only replaced by `reload` or a sampler color update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub color: Rgb,
    pub font_size: f32,
    pub style: Style,
    pub opacity: f32,
    pub position_mode: PositionMode,
    pub position_preset: PositionPreset,
    pub position_x: Option<i32>,
    pub position_y: Option<i32>,
    pub background_color: Rgb,
    pub screen_sampling: ScreenSampling,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: Rgb::new(255, 255, 255),
            font_size: 78.0,
            style: Style::Normal,
            opacity: 0.5,
            position_mode: PositionMode::Preset,
            position_preset: PositionPreset::Center,
            position_x: None,
            position_y: None,
            background_color: Rgb::new(0, 0, 0),
            screen_sampling: ScreenSampling::default(),
        }
    }
}

impl Config {
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("intime/config.json"))
    }

    /// Defaults overlaid by the user config file (or the bundled example when
    /// no user file exists). A missing or corrupt file is never fatal.
    pub fn load() -> Self {
        if let Some(path) = Self::user_config_path()
            && let Some(config) = Self::load_from(&path)
        {
            return config;
        }

        match serde_json::from_str(EXAMPLE_CONFIG) {
            Ok(config) => {
                info!("using bundled example config");
                config
            }
            Err(e) => {
                warn!("bundled example config is invalid ({e}); using defaults");
                Self::default()
            }
        }
    }

    /// One file layer: `None` when the file is absent, unreadable, or does
    /// not parse, so the caller can fall through to the next layer.
    fn load_from(path: &std::path::Path) -> Option<Self> {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => {
                    info!("config loaded from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("ignoring corrupt config {}: {e}", path.display());
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("could not read {}: {e}", path.display());
                None
            }
        }
    }

    /// Apply the CLI layer on top. A fixed `--color` also force-disables
    /// screen sampling so the sampler never fights an explicit choice.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(color) = overrides.color {
            self.color = color;
            self.screen_sampling.enabled = false;
        }
        if let Some(font_size) = overrides.font_size {
            self.font_size = font_size;
        }
        if let Some(opacity) = overrides.opacity {
            self.opacity = opacity;
        }
        if let Some(style) = overrides.style {
            self.style = style;
        }
        if let Some(preset) = overrides.position_preset {
            self.position_mode = PositionMode::Preset;
            self.position_preset = preset;
        }
        if overrides.position_x.is_some() || overrides.position_y.is_some() {
            self.position_mode = PositionMode::Custom;
            if overrides.position_x.is_some() {
                self.position_x = overrides.position_x;
            }
            if overrides.position_y.is_some() {
                self.position_y = overrides.position_y;
            }
        }
    }

    pub fn style_name(&self) -> &'static str {
        match self.style {
            Style::Normal => "normal",
            Style::Lightbulb => "lightbulb",
            Style::Bordered => "bordered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    #[test]
    fn defaults_fill_missing_keys() {
        let config: Config = serde_json::from_str(r##"{"color": "#00ff00"}"##).unwrap();
        assert_eq!(config.color, Rgb::new(0, 255, 0));
        assert_eq!(config.font_size, 78.0);
        assert_eq!(config.style, Style::Normal);
        assert!(!config.screen_sampling.enabled);
    }

    #[test]
    fn nested_sampling_section_parses() {
        let config: Config = serde_json::from_str(
            r#"{"screen_sampling": {"enabled": true, "update_interval": 0.25}}"#,
        )
        .unwrap();
        assert!(config.screen_sampling.enabled);
        assert_eq!(config.screen_sampling.update_interval, 0.25);
        // Unspecified nested key still defaults.
        assert_eq!(config.screen_sampling.throttle_threshold, 15.0);
    }

    #[test]
    fn bundled_example_is_valid() {
        let config: Config = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.opacity > 0.0);
    }

    #[test]
    fn color_override_disables_sampling() {
        let mut config = Config {
            screen_sampling: ScreenSampling {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        config.apply_overrides(&Overrides {
            color: Some(Rgb::new(255, 0, 0)),
            ..Default::default()
        });
        assert_eq!(config.color, Rgb::new(255, 0, 0));
        assert!(!config.screen_sampling.enabled);
    }

    #[test]
    fn coordinate_override_switches_to_custom_mode() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            position_x: Some(120),
            ..Default::default()
        });
        assert_eq!(config.position_mode, PositionMode::Custom);
        assert_eq!(config.position_x, Some(120));
        assert_eq!(config.position_y, None);
    }

    #[test]
    fn corrupt_json_keeps_serde_error() {
        assert!(serde_json::from_str::<Config>("{not json").is_err());
    }

    #[test]
    fn file_layer_reads_and_falls_through() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("config.json");
        std::fs::write(&good, r##"{"opacity": 0.9, "color": "#112233"}"##).unwrap();
        let config = Config::load_from(&good).unwrap();
        assert_eq!(config.opacity, 0.9);
        assert_eq!(config.color, Rgb::new(0x11, 0x22, 0x33));

        // Corrupt and missing files both fall through to the next layer.
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{oops").unwrap();
        assert!(Config::load_from(&bad).is_none());
        assert!(Config::load_from(&dir.path().join("absent.json")).is_none());
    }
}
