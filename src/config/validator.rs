//! Config validation: base path and resource declaration consistency.

use crate::config::ApiConfig;
use crate::error::ConfigError;

pub fn validate(config: &ApiConfig) -> Result<(), ConfigError> {
    if !config.base.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "base must start with '/': {}",
            config.base
        )));
    }
    if config.query_param.is_empty() {
        return Err(ConfigError::Validation("queryParam must not be empty".into()));
    }
    if config.max_body_bytes == 0 {
        return Err(ConfigError::Validation("maxBodyBytes must be positive".into()));
    }

    for decl in &config.resources {
        let name = decl.name();
        if name.is_empty() {
            return Err(ConfigError::Validation("resource name must not be empty".into()));
        }
        if name.contains('/') || name == "_" {
            return Err(ConfigError::Validation(format!(
                "resource name is not a single path segment: {}",
                name
            )));
        }
        if let crate::config::ResourceDeclaration::Full(spec) = decl {
            if spec.id.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "resource {} has an empty identifier field",
                    name
                )));
            }
        }
    }

    Ok(())
}
