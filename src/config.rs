use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// The prefecture selector is pinned to this value.
    #[serde(default = "default_prefecture")]
    pub prefecture: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { prefecture: default_prefecture() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_zoom_start")]
    pub zoom_start: u8,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom_start: default_zoom_start(),
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_prefecture() -> String {
    "福岡県".to_string()
}

fn default_zoom_start() -> u8 {
    15
}

fn default_width() -> u32 {
    1200
}

fn default_height() -> u32 {
    800
}

fn default_port() -> u16 {
    8501
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
