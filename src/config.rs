use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::PipelineConfig;

const DEFAULT_SOURCE: &str = "stub://camera0";
const DEFAULT_TTL_MS: u64 = 2_000;
const DEFAULT_SINK_LABEL: &str = "Video";

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    source: Option<String>,
    ttl_ms: Option<u64>,
    sink_label: Option<String>,
    max_read_retries: Option<u32>,
}

/// Daemon configuration, layered from an optional JSON file (named by
/// `FRAMEMARK_CONFIG`) and environment variable overrides.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub source: String,
    pub ttl: Duration,
    pub sink_label: String,
    pub max_read_retries: u32,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMEMARK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            ttl: Duration::from_millis(file.ttl_ms.unwrap_or(DEFAULT_TTL_MS)),
            sink_label: file
                .sink_label
                .unwrap_or_else(|| DEFAULT_SINK_LABEL.to_string()),
            max_read_retries: file.max_read_retries.unwrap_or(0),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("FRAMEMARK_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(label) = std::env::var("FRAMEMARK_SINK_LABEL") {
            if !label.trim().is_empty() {
                self.sink_label = label;
            }
        }
        if let Ok(ttl_ms) = std::env::var("FRAMEMARK_TTL_MS") {
            let millis: u64 = ttl_ms
                .parse()
                .map_err(|_| anyhow!("FRAMEMARK_TTL_MS must be an integer number of milliseconds"))?;
            self.ttl = Duration::from_millis(millis);
        }
        if let Ok(retries) = std::env::var("FRAMEMARK_MAX_READ_RETRIES") {
            let retries: u32 = retries
                .parse()
                .map_err(|_| anyhow!("FRAMEMARK_MAX_READ_RETRIES must be an integer"))?;
            self.max_read_retries = retries;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("frame source must not be empty"));
        }
        if self.ttl.is_zero() {
            return Err(anyhow!("overlay ttl must be greater than zero"));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            source: self.source.clone(),
            ttl: self.ttl,
            sink_label: self.sink_label.clone(),
            max_read_retries: self.max_read_retries,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
