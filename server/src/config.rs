use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use soaring_shared::config::{GliderConfig, DEFAULT_PALETTE};
use soaring_shared::grid::{Grid, GridError};
use thiserror::Error;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "SOARING_CONFIG";
/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "soaring.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to load height map: {0}")]
    Grid(#[from] GridError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Broadcast period (ms)
    pub tick_ms: u64,
    pub lobby_ms: u64,
    pub flight_ms: u64,
    pub scoring_ms: u64,
    pub rng_seed: u64,
    /// Terrain width and height in grid cells
    pub terrain_size: [usize; 2],
    /// JSON elevation grid; its dimensions replace `terrain_size`
    pub height_map: Option<PathBuf>,
    /// Altitude of the shared starting position
    pub start_altitude: f64,
    pub max_connections: usize,
    /// Larger text frames are dropped unparsed
    pub max_message_bytes: usize,
    pub max_name_len: usize,
    pub palette: Vec<String>,
    pub glider: GliderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            tick_ms: 100,
            lobby_ms: 10_000,
            flight_ms: 120_000,
            scoring_ms: 10_000,
            rng_seed: 42,
            terrain_size: [128, 128],
            height_map: None,
            start_altitude: 3.0,
            max_connections: 256,
            max_message_bytes: 4096,
            max_name_len: 32,
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            glider: GliderConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Config file chosen from `SOARING_CONFIG`, falling back to
    /// `soaring.toml` in the working directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    /// Read `height_map`, if set, and take the terrain size from it.
    pub fn resolve_terrain(&mut self) -> Result<(), ConfigError> {
        let Some(path) = &self.height_map else {
            return Ok(());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let grid = Grid::from_json(&json)?;
        self.terrain_size = [grid.width(), grid.height()];
        tracing::info!(
            "Loaded height map {} ({}x{})",
            path.display(),
            grid.width(),
            grid.height()
        );
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(msg: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        }
        if self.tick_ms == 0 {
            return invalid("tick_ms must be > 0");
        }
        if self.lobby_ms == 0 || self.flight_ms == 0 || self.scoring_ms == 0 {
            return invalid("phase durations must be > 0");
        }
        if self.terrain_size[0] == 0 || self.terrain_size[1] == 0 {
            return invalid("terrain_size must be non-zero");
        }
        if !self.start_altitude.is_finite() {
            return invalid("start_altitude must be finite");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be > 0");
        }
        if self.max_message_bytes == 0 {
            return invalid("max_message_bytes must be > 0");
        }
        if self.palette.is_empty() {
            return invalid("palette must have at least one color");
        }
        self.glider.validate().map_err(ConfigError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            listen_addr = "127.0.0.1:9100"
            flight_ms = 60000

            [glider]
            velocity_ne = 250.0
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.flight_ms, 60_000);
        assert_eq!(config.lobby_ms, 10_000);
        assert_eq!(config.glider.velocity_ne, 250.0);
        assert_eq!(config.glider.polar.len(), 19);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn polar_points_parse_from_tables() {
        let config = ServerConfig::from_toml(
            r#"
            [[glider.polar]]
            kmh = 80
            sink = -0.8

            [[glider.polar]]
            kmh = 90
            sink = -0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.glider.polar.len(), 2);
        assert_eq!(config.glider.polar[1].kmh, 90);
    }

    #[test]
    fn zero_tick_invalid() {
        let config = ServerConfig {
            tick_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_palette_invalid() {
        let config = ServerConfig {
            palette: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            ServerConfig::from_toml("tick_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/soaring.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn no_path_gives_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.tick_ms, 100);
    }
}
