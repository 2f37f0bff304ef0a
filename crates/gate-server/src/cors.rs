//! CORS headers and preflight handling.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gate_settings::WebSettings;

use crate::errors::ServerError;

/// Header values stamped on every response.
#[derive(Clone, Debug)]
pub struct CorsHeaders {
    origin: HeaderValue,
    methods: HeaderValue,
    headers: HeaderValue,
}

impl CorsHeaders {
    /// Build from the web settings, rejecting values that are not valid
    /// header text.
    pub fn from_settings(web: &WebSettings) -> Result<Self, ServerError> {
        Ok(Self {
            origin: header_value(ACCESS_CONTROL_ALLOW_ORIGIN, &web.allowed_origins)?,
            methods: header_value(ACCESS_CONTROL_ALLOW_METHODS, &web.allowed_methods)?,
            headers: header_value(ACCESS_CONTROL_ALLOW_HEADERS, &web.allowed_headers)?,
        })
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        let _ = headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        let _ = headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        let _ = headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
        let _ = headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
}

fn header_value(name: HeaderName, value: &str) -> Result<HeaderValue, ServerError> {
    HeaderValue::from_str(value).map_err(|_| ServerError::InvalidHeader {
        name: name.to_string(),
        value: value.to_owned(),
    })
}

/// Adds CORS headers; answers any `OPTIONS` request with an empty 200.
pub async fn cors_middleware(State(cors): State<Arc<CorsHeaders>>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    cors.apply(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_headers() {
        let cors = CorsHeaders::from_settings(&WebSettings::default()).unwrap();
        assert_eq!(cors.origin, "*");
        assert_eq!(cors.methods, "GET,POST,PUT,DELETE,PATCH,OPTIONS");
    }

    #[test]
    fn control_characters_are_rejected() {
        let web = WebSettings {
            allowed_origins: "bad\nvalue".into(),
            ..WebSettings::default()
        };
        let err = CorsHeaders::from_settings(&web).unwrap_err();
        assert!(matches!(err, ServerError::InvalidHeader { .. }));
    }
}
