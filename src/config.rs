use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::markers::overlay::IconSizes;

/// Static description of one selectable map.
#[derive(Debug, Clone, Deserialize)]
pub struct MapProfile {
    pub name: String,
    /// Tile root: local directory or HTTP base URL.
    pub tiles_root: String,
    /// Full map image dimensions in pixels.
    pub width: u32,
    pub height: u32,
    /// Hexagon icon circumradius in map units; differs per map because
    /// the hex grids were rendered at different scales.
    pub hex_icon_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    /// Marker colors the picker cycles through (hex RGB strings).
    pub palette: Vec<String>,
    /// Circle icon radius in map units, shared by all maps.
    pub circle_icon_size: f64,
    pub maps: Vec<MapProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            palette: vec![
                "#ff0000".to_string(),
                "#00a8f3".to_string(),
                "#22b14c".to_string(),
                "#ffc90e".to_string(),
                "#a349a4".to_string(),
                "#ffffff".to_string(),
                "#000000".to_string(),
            ],
            circle_icon_size: 10.0,
            maps: vec![
                MapProfile {
                    name: "abyssal-expedition".to_string(),
                    tiles_root: "data/tiles/abex".to_string(),
                    width: 4096,
                    height: 4096,
                    hex_icon_size: 36.0,
                },
                MapProfile {
                    name: "hunting-fields".to_string(),
                    tiles_root: "data/tiles/hf".to_string(),
                    width: 3072,
                    height: 3072,
                    hex_icon_size: 28.0,
                },
            ],
        }
    }
}

impl Config {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn profile(&self, name: &str) -> Option<&MapProfile> {
        self.maps.iter().find(|m| m.name == name)
    }

    /// Icon base sizes for one map.
    pub fn icon_sizes(&self, profile: &MapProfile) -> IconSizes {
        IconSizes {
            circle: self.circle_icon_size,
            hex: profile.hex_icon_size,
        }
    }
}
