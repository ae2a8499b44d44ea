//! Typed errors and HTTP mapping.

use crate::response::ResponseIntent;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("schema for field '{field}': {message}")]
    Schema { field: String, message: String },
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures raised by a store backend. Surfaced verbatim to the client.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database failed to initialize")]
    Initialization,
    #[error("{property} {message}")]
    Validation { property: String, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn validation(property: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            property: property.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ResponseIntent::from(self).into_response()
    }
}
