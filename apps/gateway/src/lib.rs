// [apps/gateway/src/lib.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY LIBRARY ROOT (V1.0)
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L3)
 * RESPONSABILIDAD: DEFINICIÓN DEL ÁRBOL DE MÓDULOS DEL CONTROL PLANE
 * =================================================================
 */

/// HMAC worker-authentication primitives (spec §4.A).
pub mod auth;
/// HTTP-facing error surface wrapping the domain and store error types.
pub mod error;
/// Adaptadores de entrada para HTTP y WebSockets.
pub mod handlers;
/// Núcleo de mando y control para la ignición del servidor.
pub mod kernel;
/// Guardianes de autenticación para workers y usuarios.
pub mod middleware;
/// Topología de rutas del control plane.
pub mod routes;
/// Servicios de aplicación: dispatch, sweep de registro.
pub mod services;
/// Estado compartido: registro de workers, multiplexor de streams, cadena de recibos.
pub mod state;

pub mod prelude {
    pub use crate::kernel::GatewayKernel;
    pub use crate::state::AppState;
}
