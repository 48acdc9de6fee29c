use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{FitMode, Orientation};

pub const IMAGE_WIDTH: f64 = 200.0;
pub const IMAGE_HEIGHT: f64 = 160.0;
pub const CAPTION_HEIGHT: f64 = 20.0;
pub const CELL_GAP: f64 = 20.0;
pub const BORDER_MARGIN: f64 = 5.0;
pub const DOCK_MARGIN: f64 = 50.0;
pub const SIDE_MARGIN: f64 = 20.0;
pub const CLOSE_SIZE: f64 = 16.0;

pub const CORNER_RADIUS: f32 = 8.0;
pub const BORDER_WIDTH: f32 = 2.0;
pub const CAPTION_FONT_SIZE: f32 = 12.0;

pub const HIDE_DELAY: Duration = Duration::from_millis(500);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const CONFIG_DIR: &str = "dockpeek";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,

    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Invalid color '{value}' for theme.{field}")]
    InvalidColor { field: &'static str, value: String },

    #[error("IO error on config file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dock titles that differ from the owner name the provider reports.
    pub aliases: HashMap<String, String>,
    pub theme: Theme,
    pub layout: LayoutSettings,
    pub dock: DockSettings,
}

impl Default for Config {
    fn default() -> Self {
        let mut aliases = HashMap::new();
        aliases.insert("Visual Studio Code".to_string(), "Code".to_string());
        Self {
            aliases,
            theme: Theme::default(),
            layout: LayoutSettings::default(),
            dock: DockSettings::default(),
        }
    }
}

/// Colors as `#AARRGGBB` or `#RRGGBB`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: String,
    pub highlight: String,
    pub border: String,
    pub caption: String,
    pub close: String,
    pub close_hover: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "#cc000000".to_string(),
            highlight: "#cc333333".to_string(),
            border: "#ffffffff".to_string(),
            caption: "#ffffffff".to_string(),
            close: "#ccaa3333".to_string(),
            close_hover: "#ffdd4444".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub fn parse_color(value: &str) -> Option<Rgba> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        6 => Some(Rgba {
            a: 0xff,
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
        }),
        8 => Some(Rgba {
            a: byte(0)?,
            r: byte(2)?,
            g: byte(4)?,
            b: byte(6)?,
        }),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub background: Rgba,
    pub highlight: Rgba,
    pub border: Rgba,
    pub caption: Rgba,
    pub close: Rgba,
    pub close_hover: Rgba,
}

impl Theme {
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        let color = |field: &'static str, value: &str| {
            parse_color(value).ok_or_else(|| ConfigError::InvalidColor {
                field,
                value: value.to_string(),
            })
        };
        Ok(Palette {
            background: color("background", &self.background)?,
            highlight: color("highlight", &self.highlight)?,
            border: color("border", &self.border)?,
            caption: color("caption", &self.caption)?,
            close: color("close", &self.close)?,
            close_hover: color("close_hover", &self.close_hover)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub dock: Orientation,
    pub preview: FitMode,
}

/// How the dock is found on compositors without an accessibility tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockSettings {
    /// Layer-shell namespace of the dock surface.
    pub namespace: String,
    /// Dock entries in display order.
    pub items: Vec<String>,
}

impl Default for DockSettings {
    fn default() -> Self {
        Self {
            namespace: "nwg-dock".to_string(),
            items: Vec::new(),
        }
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Parse a config file. Missing fields fall back to their defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    config.theme.palette()?;
    Ok(config)
}

/// Load the config, writing the defaults out first if the file is missing.
pub fn load_or_create(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = toml::to_string_pretty(&Config::default()).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        std::fs::write(path, text)?;
        info!(event = "config.file.created", path = %path.display());
    }
    let config = load_from(path)?;
    debug!(event = "config.file.loaded", path = %path.display(), ?config);
    Ok(config)
}

/// Re-read the file after a change, keeping `current` when the new contents
/// are unusable.
pub fn reload(path: &Path, current: &Config) -> Config {
    match load_from(path) {
        Ok(config) => {
            info!(event = "config.file.reloaded", path = %path.display());
            config
        }
        Err(e) => {
            warn!(
                event = "config.file.reload_failed",
                path = %path.display(),
                error = %e,
                "Keeping previous configuration"
            );
            current.clone()
        }
    }
}
