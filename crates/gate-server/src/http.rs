//! HTTP transport: request parsing, routing, and JSON envelopes.

use std::net::SocketAddr;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json, Response};
use gate_core::{Connection, GateError, HttpMethod, Params, TransportKind};
use metrics::counter;
use serde_json::{Value, json};
use tracing::debug;

use crate::metrics::HTTP_ROUTE_MISSES_TOTAL;
use crate::server::AppState;

/// Path relative to `prefix`, if `path` lies under it on a segment boundary.
///
/// `/api` and `/api/x` are under `/api`; `/apiary` is not.
pub fn strip_api_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Parse `application/x-www-form-urlencoded` text.
///
/// A key seen once maps to a string; a repeated key maps to an array of
/// strings in arrival order.
pub fn parse_form(input: &str) -> Params {
    let mut params = Params::new();
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        let value = Value::String(value.into_owned());
        match params.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                let _ = params.insert(key.into_owned(), value);
            }
        }
    }
    params
}

/// Parse a request body according to its content type.
///
/// Only JSON objects and form bodies contribute parameters; anything else is
/// ignored. An empty body contributes nothing.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Params, GateError> {
    let content_type = content_type.unwrap_or_default();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Params::new());
    }

    if content_type.contains("application/json") {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(GateError::MalformedRequest {
                message: "failed to parse JSON body: expected an object".into(),
            }),
            Err(e) => Err(GateError::MalformedRequest {
                message: format!("failed to parse JSON body: {e}"),
            }),
        }
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let text = std::str::from_utf8(body).map_err(|e| GateError::MalformedRequest {
            message: format!("failed to parse form data: {e}"),
        })?;
        Ok(parse_form(text))
    } else {
        Ok(Params::new())
    }
}

/// Merge parameter layers; later layers win on key collisions.
pub fn merge_params(layers: impl IntoIterator<Item = Params>) -> Params {
    let mut merged = Params::new();
    for layer in layers {
        merged.extend(layer);
    }
    merged
}

/// Success envelope.
pub fn success_response(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

/// Failure envelope with the status derived from the error kind.
pub fn error_response(err: &GateError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "success": false, "error": err.to_error_body() })),
    )
        .into_response()
}

/// Fallback handler: every request not claimed by another route.
pub async fn handle_api(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    let Ok(method) = parts.method.as_str().parse::<HttpMethod>() else {
        return error_response(&route_miss(parts.method.as_str(), path));
    };

    let resolved = strip_api_prefix(path, &state.api_route)
        .and_then(|relative| state.routes.resolve(method, relative));
    let Some(route) = resolved else {
        return error_response(&route_miss(method.as_str(), path));
    };

    let query = parts.uri.query().map(parse_form).unwrap_or_default();
    let body_params = if method.has_body() {
        let bytes = match to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(&GateError::MalformedRequest {
                    message: format!("failed to read request body: {e}"),
                });
            }
        };
        let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        match parse_body(content_type, &bytes) {
            Ok(params) => params,
            Err(err) => return error_response(&err),
        }
    } else {
        Params::new()
    };
    let params = merge_params([route.to_params(), query, body_params]);

    let identifier = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.to_string());
    let conn = Connection::new(TransportKind::Http, identifier);

    let outcome = state
        .dispatcher
        .dispatch(&conn, route.action.name(), params, method.as_str(), path)
        .await;
    match outcome.into_result() {
        Ok(data) => success_response(data),
        Err(err) => error_response(&err),
    }
}

fn route_miss(method: &str, path: &str) -> GateError {
    counter!(HTTP_ROUTE_MISSES_TOTAL).increment(1);
    debug!(method, path, "no route");
    GateError::RouteNotFound {
        method: method.to_owned(),
        path: path.to_owned(),
    }
}
