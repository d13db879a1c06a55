//! Engine configuration
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ownership::CENTRAL_INSTITUTE;
use crate::search::COUNT_PAGE_SIZE;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of the sled database.
    pub database_path: PathBuf,
    /// Institute name stamped on records created by central users.
    pub central_institute_name: String,
    /// Divisor used for `total_pages` on every listing, independent of the page limit.
    pub count_page_size: usize,
    /// Fallback filter for [`crate::telemetry::init_tracing`].
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("capdev.db"),
            central_institute_name: CENTRAL_INSTITUTE.to_string(),
            count_page_size: COUNT_PAGE_SIZE,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(raw).context("failed to parse engine config")?;
        if config.count_page_size == 0 {
            anyhow::bail!("count_page_size must be greater than zero");
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn open_database(&self) -> anyhow::Result<Arc<sled::Db>> {
        let db = sled::open(&self.database_path).with_context(|| {
            format!("failed to open database at {}", self.database_path.display())
        })?;
        Ok(Arc::new(db))
    }
}
