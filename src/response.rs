//! Response envelopes and their serialization (plain JSON or callback-wrapped).

use crate::document::to_plain;
use crate::error::AppError;
use crate::store::WriteOutcome;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Instant;

/// Multi-item read envelope.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResponseEnvelope {
    pub count: usize,
    pub items: Vec<Value>,
    /// No cache exists; always false.
    pub cached: bool,
    /// Milliseconds since the request arrived.
    pub elapsed: u64,
}

impl ResponseEnvelope {
    pub fn from_items(items: Vec<Value>, started: Instant) -> Self {
        let items: Vec<Value> = items.into_iter().map(to_plain).collect();
        ResponseEnvelope {
            count: items.len(),
            items,
            cached: false,
            elapsed: started.elapsed().as_millis() as u64,
        }
    }

    /// A single result becomes a one-element list; a missing one an empty list.
    pub fn from_single(item: Option<Value>, started: Instant) -> Self {
        Self::from_items(item.into_iter().collect(), started)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DeleteEnvelope {
    pub success: bool,
    pub result: WriteOutcome,
}

/// What the pipeline decided to send: a status and a JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseIntent {
    pub status: StatusCode,
    pub body: Value,
}

impl ResponseIntent {
    pub fn envelope(envelope: ResponseEnvelope) -> Self {
        Self::json(StatusCode::OK, &envelope)
    }

    pub fn created(document: Value) -> Self {
        ResponseIntent {
            status: StatusCode::CREATED,
            body: to_plain(document),
        }
    }

    pub fn updated(outcome: WriteOutcome) -> Self {
        Self::json(StatusCode::OK, &outcome)
    }

    pub fn deleted(outcome: WriteOutcome) -> Self {
        Self::json(
            StatusCode::OK,
            &DeleteEnvelope {
                success: outcome.ok == 1,
                result: outcome,
            },
        )
    }

    pub fn error(status: StatusCode, error: Value) -> Self {
        ResponseIntent {
            status,
            body: serde_json::json!({ "error": error }),
        }
    }

    fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        ResponseIntent {
            status,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    /// Serialize, wrapping in `callback(...)` when one is given and valid.
    pub fn render(self, callback: Option<&str>) -> Response {
        match callback.filter(|cb| valid_callback(cb)) {
            Some(cb) => {
                let body = format!("/**/ typeof {cb} === 'function' && {cb}({});", self.body);
                let mut response = (self.status, body).into_response();
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/javascript; charset=utf-8"),
                );
                response
            }
            None => (self.status, Json(self.body)).into_response(),
        }
    }
}

impl From<AppError> for ResponseIntent {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::Initialization => {
                ResponseIntent::error(StatusCode::SERVICE_UNAVAILABLE, Value::String(err.to_string()))
            }
            AppError::Validation { property, message } => ResponseIntent::error(
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "property": property, "message": message }),
            ),
            AppError::Store(e) => ResponseIntent::error(StatusCode::BAD_REQUEST, Value::String(e.to_string())),
            AppError::BadRequest(m) => ResponseIntent::error(StatusCode::BAD_REQUEST, Value::String(m.clone())),
            AppError::Config(e) => {
                ResponseIntent::error(StatusCode::INTERNAL_SERVER_ERROR, Value::String(e.to_string()))
            }
        }
    }
}

impl IntoResponse for ResponseIntent {
    fn into_response(self) -> Response {
        self.render(None)
    }
}

fn valid_callback(name: &str) -> bool {
    static CALLBACK: OnceLock<Option<Regex>> = OnceLock::new();
    CALLBACK
        .get_or_init(|| Regex::new(r"^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*|\[\d+\])*$").ok())
        .as_ref()
        .map(|re| name.len() <= 128 && re.is_match(name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_results_are_wrapped() {
        let started = Instant::now();
        let env = ResponseEnvelope::from_single(Some(json!({"id": 1})), started);
        assert_eq!(env.count, 1);
        assert_eq!(env.items, vec![json!({"id": 1})]);
        assert!(!env.cached);
        let empty = ResponseEnvelope::from_single(None, started);
        assert_eq!(empty.count, 0);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn envelope_flattens_native_values() {
        let env = ResponseEnvelope::from_items(
            vec![json!({"_id": {"$oid": "507f1f77bcf86cd799439011"}})],
            Instant::now(),
        );
        assert_eq!(env.items[0]["_id"], json!("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn deletes_are_wrapped_and_updates_pass_through() {
        let d = ResponseIntent::deleted(WriteOutcome::matched(1));
        assert_eq!(d.body, json!({"success": true, "result": {"ok": 1, "n": 1}}));
        let u = ResponseIntent::updated(WriteOutcome::matched(0));
        assert_eq!(u.body, json!({"ok": 1, "n": 0}));
    }

    #[test]
    fn errors_map_to_error_bodies() {
        let i = ResponseIntent::from(AppError::validation("name", "is required"));
        assert_eq!(i.status, StatusCode::BAD_REQUEST);
        assert_eq!(i.body, json!({"error": {"property": "name", "message": "is required"}}));
        let i = ResponseIntent::from(AppError::Initialization);
        assert_eq!(i.body, json!({"error": "Database failed to initialize"}));
    }

    #[test]
    fn callback_names_are_checked() {
        assert!(valid_callback("cb"));
        assert!(valid_callback("jQuery.handlers[3]"));
        assert!(!valid_callback("alert(1)"));
        assert!(!valid_callback(""));
    }
}
