//! Client configuration.
//!
//! Defaults point at the public cataas.com service. A `cat.toml` file in the
//! working directory overrides them, and environment variables override the
//! file.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://cataas.com";
pub const DEFAULT_RECORD_BATCH_LIMIT: u32 = 10;
pub const DEFAULT_CONFIG_FILE: &str = "cat.toml";

pub const BASE_URL_ENV_VAR: &str = "CAT_API_BASE_URL";
pub const RECORD_BATCH_LIMIT_ENV_VAR: &str = "CAT_RECORD_BATCH_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatConfig {
    pub base_url: String,
    /// Number of records requested by `CatController::fetch_record_batch`.
    pub record_batch_limit: u32,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            record_batch_limit: DEFAULT_RECORD_BATCH_LIMIT,
        }
    }
}

impl CatConfig {
    /// Defaults, then `cat.toml` if present, then environment overrides.
    pub fn load() -> Self {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(raw)?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(BASE_URL_ENV_VAR) {
            self.base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var(RECORD_BATCH_LIMIT_ENV_VAR) {
            match v.parse() {
                Ok(limit) => self.record_batch_limit = limit,
                Err(_) => warn!(value = %v, "ignoring non-numeric record batch limit"),
            }
        }
    }
}
