//! Webhook transport — the HTTP endpoint the platform pushes subscription
//! events to.
//!
//! When a shared secret is configured, the raw body's HMAC-SHA256 signature
//! must validate before the body is trusted.

use apiary_core::config::TransportConfig;
use apiary_core::envelope::Envelope;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded envelope signature.
const SIGNATURE_HEADER: &str = "x-apiary-signature";

#[derive(Clone)]
struct WebhookState {
    tx: mpsc::Sender<Envelope>,
    secret: Option<String>,
}

/// Hex HMAC-SHA256 of `body` under `secret`.
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison, so signature checks don't leak timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Validate the signature header against the raw body. `None` means the
/// envelope may be trusted.
fn check_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: &Option<String>,
) -> Option<(StatusCode, Json<Value>)> {
    let secret = match secret {
        Some(s) => s,
        None => return None, // No secret configured — accept all.
    };

    let presented = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(signature) if constant_time_eq(signature, &sign(secret, body)) => None,
        Some(_) => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid signature"})),
        )),
        None => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing signature"})),
        )),
    }
}

/// `POST /envelope` — one subscription event per request.
async fn receive_envelope(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = check_signature(&headers, &body, &state.secret) {
        warn!("webhook: rejected envelope with bad signature");
        return rejection;
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("webhook: malformed envelope: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "malformed envelope"})),
            );
        }
    };

    if state.tx.send(envelope).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "runtime shutting down"})),
        );
    }

    (StatusCode::OK, Json(json!({"ok": true})))
}

fn build_router(state: WebhookState) -> Router {
    Router::new()
        .route("/envelope", post(receive_envelope))
        .with_state(state)
}

/// Serve the webhook endpoint until the runtime shuts down.
pub async fn serve(config: TransportConfig, tx: mpsc::Sender<Envelope>) {
    let secret = if config.secret.is_empty() {
        None
    } else {
        Some(config.secret.clone())
    };

    let app = build_router(WebhookState { tx, secret });
    let addr = format!("0.0.0.0:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("webhook transport failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("webhook transport listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("webhook transport error: {e}");
    }
}
