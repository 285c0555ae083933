//! HTTP handlers for the probe proxy

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use super::override_state::{format_duration, OverrideMode};
use super::{ProxyError, ProxyState};

/// Path prefix of the administrative route
pub const SET_OVERRIDE_PREFIX: &str = "/setOverride/";

/// Headers that describe the inbound hop rather than the probe itself
const SKIPPED_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding"];

/// Content type of relayed bodies when the child doesn't name one
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Answer a probe from its override, or relay it to the child
pub async fn probe(state: ProxyState, name: &'static str, headers: HeaderMap) -> Response {
    let Some(endpoint) = state.registry.get(name) else {
        return (StatusCode::NOT_FOUND, format!("Unknown probe endpoint '{}'\n", name))
            .into_response();
    };

    let current = endpoint.record.state();
    match current.mode {
        OverrideMode::ForceSuccess => {
            let remaining = format_duration(current.expires_in);
            log::info!(
                "Returning forced success for {}, expires in {}",
                endpoint.target_url,
                remaining
            );
            return (
                StatusCode::OK,
                format!("Probe override to forced success, expires in {}\n", remaining),
            )
                .into_response();
        }
        OverrideMode::ForceFailure => {
            let remaining = format_duration(current.expires_in);
            log::info!(
                "Returning forced failure for {}, expires in {}",
                endpoint.target_url,
                remaining
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Probe override to forced failure, expires in {}\n", remaining),
            )
                .into_response();
        }
        OverrideMode::Passthrough => {}
    }

    match forward(&state.client, &endpoint.target_url, &headers).await {
        Ok(relayed) => {
            if !relayed.status.is_success() {
                log::debug!("Child answered {} with {}", endpoint.target_url, relayed.status);
            }
            let content_type = relayed
                .content_type
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
            (relayed.status, [(header::CONTENT_TYPE, content_type)], relayed.body).into_response()
        }
        Err(e) => {
            log::warn!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}

/// The child's answer to a relayed probe
struct Relayed {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

/// Relay a probe to the child and collect its answer
async fn forward(
    client: &reqwest::Client,
    target_url: &str,
    headers: &HeaderMap,
) -> Result<Relayed, ProxyError> {
    let request = client
        .get(target_url)
        .headers(forwarded_headers(headers))
        .build()
        .map_err(ProxyError::BuildRequest)?;

    let response = client.execute(request).await.map_err(ProxyError::Send)?;
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response.bytes().await.map_err(ProxyError::ReadBody)?;

    Ok(Relayed {
        status,
        content_type,
        body,
    })
}

/// Copy inbound headers for the upstream request
pub fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in SKIPPED_HEADERS {
        forwarded.remove(*name);
    }
    forwarded
}

/// First `mode` value of a query string, empty when absent
///
/// Repeated keys are allowed and an unparsable query reads as empty.
fn mode_param(uri: &Uri) -> String {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default()
        .into_iter()
        .find(|(key, _)| key == "mode")
        .map(|(_, value)| value)
        .unwrap_or_default()
}

/// `/setOverride/{endpoint}?mode=...`
///
/// The endpoint is checked before the query is looked at.
pub async fn set_override(
    State(state): State<ProxyState>,
    Path(endpoint): Path<String>,
    uri: Uri,
) -> Response {
    let Some(target) = state.registry.get(&endpoint) else {
        return invalid_endpoint(&endpoint);
    };

    let mode = match mode_param(&uri).parse::<OverrideMode>() {
        Ok(mode) => mode,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
    };

    log::info!("Setting override for '{}' to {}", target.name, mode);
    target.record.set(mode, state.override_ttl);

    (
        StatusCode::OK,
        format!(
            "Override for endpoint '{}' set to '{}' for {}\n",
            target.name,
            mode,
            format_duration(state.override_ttl)
        ),
    )
        .into_response()
}

/// Anything unrouted, including `/setOverride/` paths the route can't capture
pub async fn fallback(uri: Uri) -> Response {
    match uri.path().strip_prefix(SET_OVERRIDE_PREFIX) {
        Some(endpoint) => invalid_endpoint(endpoint),
        None => (StatusCode::NOT_FOUND, "404 page not found\n").into_response(),
    }
}

fn invalid_endpoint(endpoint: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Invalid endpoint: '{}'\n", endpoint),
    )
        .into_response()
}
