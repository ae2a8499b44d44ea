//! The assembled API: resource dispatch in front of common routes, the optional index
//! and the catch-all.

use crate::handlers::dispatch;
use crate::routes::common_routes_with_ready;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, middleware, routing::get, Json, Router};
use serde_json::{json, Value};

async fn index(State(state): State<AppState>) -> Json<Value> {
    let resources: Vec<Value> = state.registry.iter().map(|r| r.describe()).collect();
    Json(json!({
        "name": state.config.name,
        "base": &*state.base,
        "resources": resources,
    }))
}

async fn unsupported() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Unsupported URI" })))
}

pub fn api_router(state: AppState) -> Router {
    let mut router = common_routes_with_ready(state.clone());
    if state.config.index {
        let base = state.base.to_string();
        router = router.route(&base, get(index).with_state(state.clone()));
        let trimmed = base.trim_end_matches('/');
        if !trimmed.is_empty() {
            router = router.route(trimmed, get(index).with_state(state.clone()));
        }
    }
    router
        .fallback(unsupported)
        .layer(middleware::from_fn_with_state(state, dispatch))
}
