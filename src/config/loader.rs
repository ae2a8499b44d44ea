//! Load config from a JSON file and the environment.

use crate::config::ApiConfig;
use crate::error::ConfigError;
use std::path::Path;

/// Read an `ApiConfig` from a JSON file. Missing keys take their defaults.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ApiConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading config");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<ApiConfig, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Config from `CONFIG_PATH` (if set), overlaid with `DATABASE_URL`, `PORT` and `API_BASE`.
/// A `.env` file in the working directory is honoured.
pub async fn from_env() -> Result<ApiConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load_from_path(path).await?,
        Err(_) => ApiConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_overrides(
    config: &mut ApiConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Some(port) = lookup("PORT") {
        config.port = port
            .parse()
            .map_err(|_| ConfigError::Load(format!("PORT is not a port number: {}", port)))?;
    }
    if let Some(base) = lookup("API_BASE") {
        config.base = base;
    }
    Ok(())
}
