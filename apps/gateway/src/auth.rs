// [apps/gateway/src/auth.rs]
/*!
 * =================================================================
 * APARATO: WORKER HMAC AUTHENTICATOR
 * CLASIFICACIÓN: SECURITY CORE (ESTRATO L2)
 * RESPONSABILIDAD: VERIFICACIÓN DE FIRMAS Y PROTECCIÓN ANTI-REPLAY
 *
 * Implementa spec §4.A: cada petición de origen worker porta tres
 * cabeceras (X-Node-Id, X-Node-Ts, X-Node-Auth); la firma es
 * HMAC-SHA-256 sobre `body || timestamp_ascii`, con comparación en
 * tiempo constante delegada a `Mac::verify_slice` (RustCrypto ya la
 * implementa internamente — no se introduce una crate adicional de
 * comparación constante).
 * =================================================================
 */

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Replay protection window (spec §4.A step 3, §8 invariant 8).
pub const TIMESTAMP_TOLERANCE_SECONDS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacError {
    MissingHeaders,
    StaleTimestamp,
    MalformedSignature,
    SignatureMismatch,
}

/// Computes the hex-encoded HMAC-SHA-256 over `body || timestamp_ascii`,
/// keyed by the worker secret.
pub fn sign(secret: &[u8], body: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.update(timestamp.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a worker-origin request per spec §4.A steps 3-4. The secret
/// lookup (step 2) and header presence (step 1) are the caller's
/// responsibility — this function assumes the secret has already been
/// resolved for the claimed worker id.
pub fn verify(
    secret: &[u8],
    body: &[u8],
    timestamp: i64,
    signature_hex: &str,
    server_now: i64,
) -> Result<(), HmacError> {
    if (server_now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECONDS {
        return Err(HmacError::StaleTimestamp);
    }

    let signature_bytes = hex::decode(signature_hex).map_err(|_| HmacError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.update(timestamp.to_string().as_bytes());

    mac.verify_slice(&signature_bytes)
        .map_err(|_| HmacError::SignatureMismatch)
}

/// Derives the one-time handshake token for the bidirectional worker
/// channel (spec §6: "a one-time token derived from the worker secret").
/// Stable per secret epoch — rotating the secret invalidates prior tokens.
pub fn derive_handshake_token(secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(b"ws-handshake");
    hex::encode(mac.finalize().into_bytes())
}

/// Generates a high-entropy worker secret (spec §3: "≥32 bytes"), drawn
/// from the OS CSPRNG the same way the donor mints key material
/// (`secp256k1::rand::rngs::OsRng`).
pub fn mint_secret() -> Vec<u8> {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut bytes = vec![0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let secret = b"super-secret-key-material-0123456789";
        let body = br#"{"models":["llama3.2"]}"#;
        let timestamp = 1_700_000_000_i64;
        let signature = sign(secret, body, timestamp);

        let result = verify(secret, body, timestamp, &signature, timestamp);
        assert!(result.is_ok());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let secret = b"super-secret-key-material-0123456789";
        let body = b"{}";
        let timestamp = 1_700_000_000_i64;
        let signature = sign(secret, body, timestamp);

        let result = verify(secret, body, timestamp, &signature, timestamp + 121);
        assert_eq!(result, Err(HmacError::StaleTimestamp));
    }

    #[test]
    fn timestamp_exactly_at_boundary_is_accepted() {
        let secret = b"super-secret-key-material-0123456789";
        let body = b"{}";
        let timestamp = 1_700_000_000_i64;
        let signature = sign(secret, body, timestamp);

        let result = verify(secret, body, timestamp, &signature, timestamp + TIMESTAMP_TOLERANCE_SECONDS);
        assert!(result.is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = b"super-secret-key-material-0123456789";
        let timestamp = 1_700_000_000_i64;
        let signature = sign(secret, b"original", timestamp);

        let result = verify(secret, b"tampered", timestamp, &signature, timestamp);
        assert_eq!(result, Err(HmacError::SignatureMismatch));
    }

    #[test]
    fn malformed_hex_signature_is_rejected() {
        let secret = b"super-secret-key-material-0123456789";
        let timestamp = 1_700_000_000_i64;

        let result = verify(secret, b"body", timestamp, "not-hex", timestamp);
        assert_eq!(result, Err(HmacError::MalformedSignature));
    }
}
