//! Request dispatch. Runs as middleware in front of the router: requests addressed to a
//! configured resource with an enabled verb are handled here, everything else continues
//! down the stack (common routes, index, catch-all).
//!
//! Per handled request the steps run in order: store readiness, request validation and
//! compilation, policy headers, execution. The first failure short-circuits.

use crate::config::{ApiConfig, ResourceDefinition, ResourceRegistry, Verb};
use crate::error::AppError;
use crate::handlers::resource::{execute, Operation, RequestContext};
use crate::response::ResponseIntent;
use crate::service::{self, coerce_identifier, Filter, NormalizedPayload, PathTarget, RequestValidator, WriteKind};
use crate::state::AppState;
use axum::body::to_bytes;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Instant;

pub const POWERED_BY_HEADER: HeaderName = HeaderName::from_static("x-api-powered-by");
pub const POWERED_BY: &str = "Docrest-API";

const CORS_ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";
const CORS_ALL_METHODS: &str = "OPTIONS, GET, POST, PUT, DELETE, HEAD";
const CALLBACK_PARAM: &str = "callback";

/// Resolve `method path` to a resource, verb and path target. `None` means the request
/// is not ours: unknown resource, unsupported shape or a verb the resource does not expose.
pub fn resolve_route<'a>(
    registry: &'a ResourceRegistry,
    base: &str,
    method: &Method,
    path: &str,
) -> Option<(&'a ResourceDefinition, Verb, PathTarget)> {
    let rest = path.strip_prefix(base)?.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }
    let mut segments = rest.split('/').map(decode_segment);
    let name = segments.next()?;
    let resource = registry.get(&name)?;
    let segments: Vec<String> = segments.collect();
    let target = PathTarget::from_segments(&segments)?;
    let verb = match (method, &target) {
        (&Method::GET | &Method::HEAD, PathTarget::Item(_)) => Verb::ReadOne,
        (&Method::GET | &Method::HEAD, _) => Verb::Read,
        (&Method::POST, PathTarget::Collection) => Verb::Create,
        (&Method::PUT, PathTarget::Item(_)) => Verb::Update,
        (&Method::DELETE, PathTarget::Item(_)) => Verb::Delete,
        _ => return None,
    };
    if !resource.allows(verb) {
        return None;
    }
    Some((resource, verb, target))
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

pub async fn dispatch(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let Some((resource, verb, target)) =
        resolve_route(&state.registry, &state.base, &method, request.uri().path())
    else {
        return next.run(request).await;
    };

    let params: HashMap<String, String> = Query::try_from_uri(request.uri())
        .map(|Query(p)| p)
        .unwrap_or_default();
    let callback = if state.config.jsonp {
        params.get(CALLBACK_PARAM).cloned()
    } else {
        None
    };

    let mut headers = HeaderMap::new();
    headers.insert(POWERED_BY_HEADER, HeaderValue::from_static(POWERED_BY));

    if !state.ready.is_ready() {
        tracing::warn!(resource = %resource.name, "store not initialized");
        return finish(AppError::Initialization.into(), headers, callback.as_deref());
    }

    let ctx = match prepare(&state, resource, verb, target, &params, request, started).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(resource = %resource.name, verb = ?verb, error = %e, "request rejected");
            return finish(e.into(), headers, callback.as_deref());
        }
    };

    apply_policy_headers(&mut headers, &state.config, resource, verb);

    let intent = execute(&state, ctx).await.unwrap_or_else(ResponseIntent::from);
    tracing::debug!(
        resource = %resource.name,
        status = intent.status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    finish(intent, headers, callback.as_deref())
}

/// Compile reads into a plan; read, validate and normalize write bodies.
async fn prepare<'a>(
    state: &AppState,
    resource: &'a ResourceDefinition,
    verb: Verb,
    target: PathTarget,
    params: &HashMap<String, String>,
    request: Request,
    started: Instant,
) -> Result<RequestContext<'a>, AppError> {
    let text_param = state.config.query_param.as_str();
    let operation = match verb {
        Verb::Read => Operation::List(service::compile(resource, &target, params, text_param)),
        Verb::ReadOne => Operation::ReadOne(service::compile(resource, &target, params, text_param)),
        Verb::Create => Operation::Create(read_payload(&state.config, resource, WriteKind::Create, request).await?),
        Verb::Update => Operation::Update {
            filter: identifier_filter(resource, &target)?,
            payload: read_payload(&state.config, resource, WriteKind::Update, request).await?,
        },
        Verb::Delete => Operation::Delete(identifier_filter(resource, &target)?),
    };
    Ok(RequestContext {
        resource,
        verb,
        operation,
        started,
    })
}

fn identifier_filter(resource: &ResourceDefinition, target: &PathTarget) -> Result<Filter, AppError> {
    let id = target
        .item_id()
        .ok_or_else(|| AppError::BadRequest("an identifier is required".into()))?;
    Ok(Filter::equals(
        resource.identifier_field.clone(),
        coerce_identifier(resource, id),
    ))
}

async fn read_payload(
    config: &ApiConfig,
    resource: &ResourceDefinition,
    kind: WriteKind,
    request: Request,
) -> Result<NormalizedPayload, AppError> {
    let bytes = to_bytes(request.into_body(), config.max_body_bytes)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable request body: {}", e)))?;
    let body: Value = if bytes.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&bytes).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?
    };
    RequestValidator::normalize(body, resource, kind, Utc::now())
}

fn apply_policy_headers(headers: &mut HeaderMap, config: &ApiConfig, resource: &ResourceDefinition, verb: Verb) {
    if let Some(policy) = resource.cors_policy(config) {
        match HeaderValue::from_str(&policy.allow_origin) {
            Ok(origin) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            Err(_) => tracing::warn!(origin = %policy.allow_origin, "allow-origin is not a valid header value"),
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
        let methods = if policy.resource_scoped {
            HeaderValue::from_str(&format!("OPTIONS, {}, HEAD", verb.http_method()))
                .unwrap_or_else(|_| HeaderValue::from_static(CORS_ALL_METHODS))
        } else {
            HeaderValue::from_static(CORS_ALL_METHODS)
        };
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    if matches!(verb, Verb::Read | Verb::ReadOne) {
        if let Some(age) = resource.effective_max_age(config) {
            if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", age)) {
                headers.insert(header::CACHE_CONTROL, value);
            }
        }
    }
}

fn finish(intent: ResponseIntent, headers: HeaderMap, callback: Option<&str>) -> Response {
    let mut response = intent.render(callback);
    response.headers_mut().extend(headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceDeclaration;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        let decls: Vec<ResourceDeclaration> = serde_json::from_value(json!([
            "notes",
            {"name": "widgets", "id": "id", "verbs": ["read", "readOne"]}
        ]))
        .unwrap();
        ResourceRegistry::build(&decls).unwrap()
    }

    #[test]
    fn resolves_verbs_from_method_and_shape() {
        let reg = registry();
        let (_, verb, target) = resolve_route(&reg, "/", &Method::GET, "/notes").unwrap();
        assert_eq!(verb, Verb::Read);
        assert_eq!(target, PathTarget::Collection);
        let (_, verb, _) = resolve_route(&reg, "/", &Method::GET, "/notes/7/").unwrap();
        assert_eq!(verb, Verb::ReadOne);
        let (_, verb, _) = resolve_route(&reg, "/", &Method::HEAD, "/notes/_/a/b").unwrap();
        assert_eq!(verb, Verb::Read);
        let (_, verb, _) = resolve_route(&reg, "/", &Method::POST, "/notes").unwrap();
        assert_eq!(verb, Verb::Create);
        let (_, verb, _) = resolve_route(&reg, "/", &Method::PUT, "/notes/7").unwrap();
        assert_eq!(verb, Verb::Update);
        let (_, verb, _) = resolve_route(&reg, "/", &Method::DELETE, "/notes/7").unwrap();
        assert_eq!(verb, Verb::Delete);
    }

    #[test]
    fn unsupported_shapes_pass_through() {
        let reg = registry();
        assert!(resolve_route(&reg, "/", &Method::DELETE, "/notes").is_none());
        assert!(resolve_route(&reg, "/", &Method::PUT, "/notes").is_none());
        assert!(resolve_route(&reg, "/", &Method::POST, "/notes/7").is_none());
        assert!(resolve_route(&reg, "/", &Method::GET, "/notes/a/b").is_none());
        assert!(resolve_route(&reg, "/", &Method::GET, "/missing").is_none());
        assert!(resolve_route(&reg, "/", &Method::GET, "/").is_none());
        assert!(resolve_route(&reg, "/v1/", &Method::GET, "/notes").is_none());
    }

    #[test]
    fn disabled_verbs_pass_through() {
        let reg = registry();
        assert!(resolve_route(&reg, "/", &Method::GET, "/widgets/1").is_some());
        assert!(resolve_route(&reg, "/", &Method::POST, "/widgets").is_none());
        assert!(resolve_route(&reg, "/", &Method::DELETE, "/widgets/1").is_none());
    }

    #[test]
    fn segments_are_percent_decoded() {
        let reg = registry();
        let (_, _, target) = resolve_route(&reg, "/v1/", &Method::GET, "/v1/notes/_/title/a%20b").unwrap();
        assert_eq!(target, PathTarget::Filtered(vec![("title".into(), "a b".into())]));
    }

    #[test]
    fn resource_scoped_cors_names_the_method() {
        let reg = registry();
        let mut resource = reg.get("notes").unwrap().clone();
        resource.cross_domain = Some(true);
        let config = ApiConfig {
            cross_domain: false,
            ..ApiConfig::default()
        };
        let mut headers = HeaderMap::new();
        apply_policy_headers(&mut headers, &config, &resource, Verb::Update);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "OPTIONS, PUT, HEAD");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
    }

    #[test]
    fn max_age_applies_to_reads_only() {
        let reg = registry();
        let config = ApiConfig {
            max_age: Some(60),
            ..ApiConfig::default()
        };
        let resource = reg.get("notes").unwrap();
        let mut headers = HeaderMap::new();
        apply_policy_headers(&mut headers, &config, resource, Verb::Read);
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], CORS_ALL_METHODS);
        let mut headers = HeaderMap::new();
        apply_policy_headers(&mut headers, &config, resource, Verb::Create);
        assert!(headers.get(header::CACHE_CONTROL).is_none());
    }
}
