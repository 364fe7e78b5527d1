// [apps/gateway/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: AUTHENTICATION GUARDS (V1.0)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: VALIDACIÓN DE CREDENCIALES E INYECCIÓN DE IDENTIDAD
 *
 * Two citizens cross this gateway: worker nodes (HMAC headers, spec
 * §4.A) and subscriber users (a bearer token). Each guard injects its
 * identity into the request extensions for downstream handlers, in the
 * donor's extension-injection idiom.
 * =================================================================
 */

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::{debug, warn};

/// Injected by [`worker_auth_guard`]; the authenticated worker's identifier.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub worker_id: String,
}

/// Injected by [`user_guard`]; the calling user's identifier.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
}

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Worker-facing HMAC guard (spec §4.A). Reads the three `X-Node-*`
/// headers, buffers the body to verify the signature, then reinserts the
/// body so the wrapped handler can still deserialize it.
pub async fn worker_auth_guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    let worker_id = header_str(&req, "x-node-id").ok_or_else(AppError::unauthorized)?.to_string();
    let timestamp: i64 = header_str(&req, "x-node-ts")
        .and_then(|v| v.parse().ok())
        .ok_or_else(AppError::unauthorized)?;
    let signature = header_str(&req, "x-node-auth").ok_or_else(AppError::unauthorized)?.to_string();

    let secret_hex = state
        .secrets
        .get(&worker_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;
    let secret = hex::decode(&secret_hex).map_err(|_| AppError::unauthorized())?;

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::internal("failed to buffer request body"))?;

    if auth::verify(&secret, &body_bytes, timestamp, &signature, Utc::now().timestamp()).is_err() {
        warn!("❌ [AUTH_REJECTION]: Worker [{}] failed HMAC verification", worker_id);
        return Err(AppError::unauthorized());
    }

    debug!("🤖 [AUTH]: Worker [{}] verified", worker_id);
    let mut req = Request::from_parts(parts, Body::from(body_bytes));
    req.extensions_mut().insert(WorkerIdentity { worker_id });
    Ok(next.run(req).await)
}

/// Subscriber-facing guard. The bearer token *is* the user identifier —
/// session validation against an external identity provider is out of
/// scope for this control plane (spec Non-goals: "no user account
/// system beyond an opaque identifier").
pub async fn user_guard(mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(AppError::unauthorized)?
        .to_string();

    req.extensions_mut().insert(UserIdentity { user_id: token });
    Ok(next.run(req).await)
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name)?.to_str().ok()
}
