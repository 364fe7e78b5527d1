// [apps/gateway/src/handlers/receipts.rs]
/*!
 * =================================================================
 * APARATO: RECEIPT-FACING HTTP HANDLERS (V1.0)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: LISTADO PAGINADO Y VERIFICACIÓN DE LA CADENA
 * =================================================================
 */

use crate::error::AppError;
use crate::middleware::UserIdentity;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::Json;
use relay_domain::receipt::{Receipt, VerifyResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// `GET /receipts` (spec §6).
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let receipts = state.receipts.list_page(&identity.user_id, query.limit, query.offset).await?;
    Ok(Json(receipts))
}

/// `GET /receipts/verify` (spec §4.F, §6).
pub async fn verify(State(state): State<AppState>, Extension(identity): Extension<UserIdentity>) -> Result<Json<VerifyResult>, AppError> {
    let result = state.receipts.verify(&identity.user_id).await?;
    Ok(Json(result))
}
