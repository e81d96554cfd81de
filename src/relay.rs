//! Image relay server.
//!
//! Re-serves remote page images from our own origin with permissive CORS
//! headers, so browser-side consumers can read their bytes. Images under
//! the external catalog are requested with the catalog's key.

use crate::error::RelayError;
use crate::images::{RELAY_PATH, UpstreamAuth};
use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct RelayState {
    client: reqwest::Client,
    auth: Option<UpstreamAuth>,
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::MissingUrl | RelayError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::Transport(e) => {
                tracing::error!(error = %e, "image relay error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

fn cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

fn parse_target(raw: Option<&str>) -> Result<url::Url, RelayError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(RelayError::MissingUrl);
    }
    let url = url::Url::parse(raw).map_err(|e| RelayError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

async fn proxy_image(
    State(relay): State<RelayState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, RelayError> {
    let target = parse_target(query.url.as_deref())?;

    let mut request = relay.client.get(target.clone());
    if let Some(auth) = &relay.auth {
        request = auth.apply(request, &target);
    }
    let upstream = request.send().await?;
    let status = upstream.status();
    if !status.is_success() {
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("error").to_string(),
        });
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    cors_headers(headers);
    Ok(response)
}

async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors_headers(response.headers_mut());
    response
}

/// Builds the relay's router. `auth` is attached to the targets it covers.
pub fn router(auth: Option<UpstreamAuth>) -> Result<Router, RelayError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("eaders-relay/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?;

    Ok(Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route(RELAY_PATH, get(proxy_image).options(preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(RelayState { client, auth }))
}

/// Binds `addr` and serves until the process exits.
pub async fn serve(addr: SocketAddr, auth: Option<UpstreamAuth>) -> crate::error::Result<()> {
    let app = router(auth)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", addr))?;
    tracing::info!(addr = %addr, "image relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert!(matches!(parse_target(None), Err(RelayError::MissingUrl)));
        assert!(matches!(parse_target(Some("  ")), Err(RelayError::MissingUrl)));
        assert!(matches!(
            parse_target(Some("not a url")),
            Err(RelayError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_target(Some("file:///etc/passwd")),
            Err(RelayError::InvalidUrl(_))
        ));
        assert_eq!(
            parse_target(Some("https://cdn.example.com/a.png"))
                .unwrap()
                .as_str(),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            RelayError::MissingUrl.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        let upstream = RelayError::Upstream {
            status: 404,
            reason: "Not Found".to_string(),
        };
        assert_eq!(upstream.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight_headers() {
        let response = preflight().await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, OPTIONS"
        );
    }
}
