// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 * =================================================================
 */

/// Gestión del ciclo de vida de trabajos: creación, reclamación atómica,
/// transición de estado.
pub mod job;
/// Cadena de recibos encadenados por hash, por usuario.
pub mod receipt;
/// Bóveda de secretos de workers (HMAC).
pub mod worker_secret;

pub use job::JobRepository;
pub use receipt::ReceiptRepository;
pub use worker_secret::WorkerSecretRepository;
