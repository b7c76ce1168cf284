use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{error, info, warn};

use crate::{
    dns::{Changes, Endpoint},
    metrics::PROVIDER_NAME,
    AppState,
};

/// Media type of the external-dns webhook protocol. Checked by exact
/// string equality; parameters and their order matter.
pub const MEDIA_TYPE_V1: &str = "application/external.dns.webhook+json;version=1";

fn webhook_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE_V1));
    h.insert(header::VARY, HeaderValue::from_static("Content-Type"));
    h
}

/// Validate a protocol header (Accept or Content-Type) against the
/// webhook media type. Missing → 406 with a hint; anything else → 415.
fn check_media_type(
    state: &AppState,
    headers: &HeaderMap,
    name: header::HeaderName,
) -> Result<(), Response> {
    let count_error = |kind: &str| {
        state
            .metrics
            .http_validation_errors_total
            .with_label_values(&[PROVIDER_NAME, kind])
            .inc();
    };

    let Some(value) = headers.get(&name) else {
        warn!(header = %name, "request is missing protocol header");
        count_error("missing");
        return Err((
            StatusCode::NOT_ACCEPTABLE,
            format!("client must provide a {name} header with media type {MEDIA_TYPE_V1}"),
        )
            .into_response());
    };

    if value.to_str().ok() != Some(MEDIA_TYPE_V1) {
        warn!(header = %name, value = ?value, "unsupported media type");
        count_error("unsupported");
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported media type in {name} header, expected {MEDIA_TYPE_V1}"),
        )
            .into_response());
    }

    Ok(())
}

// ── GET /healthz ──────────────────────────────────────────────────────────────
// Liveness only; no protocol headers, no controller round-trip.

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

// ── GET /metrics ──────────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── GET / ─────────────────────────────────────────────────────────────────────
// Domain-filter negotiation.

pub async fn negotiate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_media_type(&state, &headers, header::ACCEPT) {
        return resp;
    }
    state
        .metrics
        .negotiate_total
        .with_label_values(&[PROVIDER_NAME])
        .inc();

    (webhook_headers(), Json(state.provider.domain_filter().clone())).into_response()
}

// ── GET /records ──────────────────────────────────────────────────────────────

pub async fn get_records(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_media_type(&state, &headers, header::ACCEPT) {
        return resp;
    }

    match state.provider.records().await {
        Ok(endpoints) => {
            info!("GET /records → {} endpoint(s)", endpoints.len());
            (webhook_headers(), Json(endpoints)).into_response()
        }
        Err(e) => {
            error!("GET /records error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── POST /records ─────────────────────────────────────────────────────────────

pub async fn apply_changes(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_media_type(&state, &headers, header::CONTENT_TYPE) {
        return resp;
    }

    let changes: Changes = match serde_json::from_slice(&body) {
        Ok(changes) => changes,
        Err(e) => {
            warn!("POST /records: invalid change payload: {e}");
            state
                .metrics
                .http_json_errors_total
                .with_label_values(&[PROVIDER_NAME, "/records"])
                .inc();
            return (StatusCode::BAD_REQUEST, format!("invalid changes payload: {e}"))
                .into_response();
        }
    };

    match state.provider.apply_changes(&changes).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("POST /records error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── POST /adjustendpoints ─────────────────────────────────────────────────────
// The controller needs no per-endpoint tweaks; echo the list back.

pub async fn adjust_endpoints(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_media_type(&state, &headers, header::ACCEPT) {
        return resp;
    }
    if let Err(resp) = check_media_type(&state, &headers, header::CONTENT_TYPE) {
        return resp;
    }
    state
        .metrics
        .adjust_endpoints_total
        .with_label_values(&[PROVIDER_NAME])
        .inc();

    let endpoints: Vec<Endpoint> = match serde_json::from_slice(&body) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            warn!("POST /adjustendpoints: invalid payload: {e}");
            state
                .metrics
                .http_json_errors_total
                .with_label_values(&[PROVIDER_NAME, "/adjustendpoints"])
                .inc();
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid endpoints payload: {e}"),
            )
                .into_response();
        }
    };

    (webhook_headers(), Json(state.provider.adjust_endpoints(endpoints))).into_response()
}
