use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REGIONS_URL: &str =
    "https://raw.githubusercontent.com/codeforamerica/click_that_hood/master/public/data/spain-provinces.geojson";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub regions: RegionsConfig,
    pub mobility: MobilityConfig,
    pub map: MapConfig,
    pub charts: ChartsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegionsConfig {
    /// http(s) URL, or a local .geojson / .json / .shp path
    pub source: String,
    pub name_property: String,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_REGIONS_URL.to_string(),
            name_property: "name".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MobilityConfig {
    pub csv: PathBuf,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            csv: PathBuf::from("data/mobility_data_province.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 500,
            zoom: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartsConfig {
    pub width: u32,
    pub height: u32,
    pub histogram_bins: Option<usize>,
    pub colors: HashMap<String, String>, // category -> hex code
}

impl Default for ChartsConfig {
    fn default() -> Self {
        let colors = [
            ("frequent", "#636EFA"),
            ("not_frequent", "#EF553B"),
            ("house", "#00CC96"),
            ("work/study", "#AB63FA"),
            ("<10", "#FFA15A"),
            ("10-15", "#19D3F3"),
            (">15", "#FF6692"),
            ("25-45", "#B6E880"),
            ("45-65", "#FF97FF"),
            ("65-100", "#FECB52"),
            ("man", "#0079BF"),
            ("woman", "#FFB6C1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            width: 480,
            height: 360,
            histogram_bins: None,
            colors,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }
}
