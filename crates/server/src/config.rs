use std::path::PathBuf;

use worldgrid_engine::{DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH, MAX_GRID_CELLS};

pub const DEFAULT_PORT: u16 = 39333;

pub fn port() -> Option<u16> {
    std::env::var("WORLDGRID_PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|value| *value > 0)
}

pub fn db_path() -> Option<PathBuf> {
    std::env::var("WORLDGRID_DB")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// `~/.worldgrid/worldgrid.db`, or the working directory when there is no home.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".worldgrid")
        .join("worldgrid.db")
}

pub fn default_grid_width() -> u32 {
    dimension("WORLDGRID_DEFAULT_WIDTH").unwrap_or(DEFAULT_GRID_WIDTH)
}

pub fn default_grid_height() -> u32 {
    dimension("WORLDGRID_DEFAULT_HEIGHT").unwrap_or(DEFAULT_GRID_HEIGHT)
}

fn dimension(key: &str) -> Option<u32> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0 && u64::from(*value) <= MAX_GRID_CELLS)
}

/// Prefix for background image URLs; a world's image is `{base}/{world_id}`.
pub fn image_base_url() -> Option<String> {
    std::env::var("WORLDGRID_IMAGE_BASE_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

/// Request-time settings shared by the handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub default_width: u32,
    pub default_height: u32,
    pub image_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_GRID_WIDTH,
            default_height: DEFAULT_GRID_HEIGHT,
            image_base_url: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            default_width: default_grid_width(),
            default_height: default_grid_height(),
            image_base_url: image_base_url(),
        }
    }

    pub fn image_url_for(&self, world_id: &str) -> Option<String> {
        self.image_base_url
            .as_ref()
            .map(|base| format!("{base}/{world_id}"))
    }
}
