// [apps/gateway/src/routes.rs]
/*!
 * =================================================================
 * APARATO: ROUTING TOPOLOGY (V1.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: TOPOLOGÍA DE RUTAS DEL CONTROL PLANE
 * =================================================================
 */

use crate::handlers::{receipts, socket, subscribe, worker};
use crate::middleware::{user_guard, worker_auth_guard};
use crate::state::AppState;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::HeaderName::from_static("x-node-id"), header::HeaderName::from_static("x-node-ts"), header::HeaderName::from_static("x-node-auth")])
        .max_age(Duration::from_secs(3600));

    // Bootstraps a worker identity; has no HMAC secret to authenticate with yet.
    let bootstrap = Router::new().route("/nodes/register", post(worker::register));

    // Worker-facing HTTP behind the HMAC guard (spec §4.A, §6).
    let worker_authenticated = Router::new()
        .route("/nodes/heartbeat", post(worker::heartbeat))
        .route("/inference/poll", get(worker::poll))
        .route("/inference/complete", post(worker::complete))
        .route("/inference/stream", post(worker::stream))
        .layer(middleware::from_fn_with_state(state.clone(), worker_auth_guard));

    // Worker-facing bidirectional socket, authenticated at handshake.
    let worker_socket = Router::new().route("/nodes/socket", get(socket::upgrade));

    // Subscriber-facing HTTP behind a bearer-token user guard (spec §6).
    let subscriber_authenticated = Router::new()
        .route("/chat/stream", post(subscribe::chat_stream))
        .route("/receipts", get(receipts::list))
        .route("/receipts/verify", get(receipts::verify))
        .layer(middleware::from_fn(user_guard));

    // Unauthenticated subscriber polling alternatives — a job id alone is
    // treated as sufficient capability since it is an unguessable UUID.
    let subscriber_open = Router::new()
        .route("/inference/delta", get(worker::delta))
        .route("/ws/subscribe", get(subscribe::subscribe_socket));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(bootstrap)
        .merge(worker_authenticated)
        .merge(worker_socket)
        .merge(subscriber_authenticated)
        .merge(subscriber_open)
        .layer(cors)
        .with_state(state)
}
