use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bitcoin::Amount;
use serde_json::json;
use std::sync::Arc;

use crate::error::{RbfError, RbfResult};
use crate::models::requests::{
    BroadcastRequest, CreateTransactionRequest, ImportKeyRequest, ReplaceTransactionRequest,
    SweepRequest,
};
use crate::models::transaction::ReplacementKind;
use crate::services::onchain::RbfEngine;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RbfEngine>,
}

fn status_for(error: &RbfError) -> StatusCode {
    match error {
        RbfError::TransactionNotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        RbfError::ChainDataUnavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_kind(error: &RbfError) -> &'static str {
    match error {
        RbfError::NoUtxos { .. } => "no_utxos",
        RbfError::InsufficientFunds { .. } => "insufficient_funds",
        RbfError::AmountBelowDust { .. } => "amount_below_dust",
        RbfError::DustAfterFees { .. } => "dust_after_fees",
        RbfError::ReplacementFeeTooLow { .. } => "replacement_fee_too_low",
        RbfError::OriginalAlreadyConfirmed { .. } => "original_already_confirmed",
        RbfError::InvalidKey(_) => "invalid_key",
        RbfError::SignatureFailure { .. } => "signature_failure",
        RbfError::InvalidFeeRate(_) => "invalid_fee_rate",
        RbfError::InvalidAddress(_) => "invalid_address",
        RbfError::RecipientOutputNotFound { .. } => "recipient_output_not_found",
        RbfError::InvalidTxid(_) => "invalid_txid",
        RbfError::TransactionNotFound { .. } => "transaction_not_found",
        RbfError::InvalidTransactionHex(_) => "invalid_transaction_hex",
        RbfError::FeeBelowQuote { .. } => "fee_below_quote",
        RbfError::ChainDataUnavailable(_) => "chain_data_unavailable",
    }
}

/// Numbers a caller needs to resubmit with adjusted parameters.
fn error_details(error: &RbfError) -> serde_json::Value {
    match error {
        RbfError::InsufficientFunds { available, required } => json!({
            "available": available,
            "required": required,
            "shortfall": required.saturating_sub(*available),
        }),
        RbfError::AmountBelowDust { value, dust_limit } => json!({
            "value": value,
            "dust_limit": dust_limit,
        }),
        RbfError::DustAfterFees { swept, fee } => json!({ "swept": swept, "fee": fee }),
        RbfError::ReplacementFeeTooLow {
            original_fee,
            original_fee_rate,
            new_fee,
            new_fee_rate,
            required_fee,
            required_fee_rate,
        } => json!({
            "original_fee": original_fee,
            "original_fee_rate": original_fee_rate,
            "new_fee": new_fee,
            "new_fee_rate": new_fee_rate,
            "required_fee": required_fee,
            "required_fee_rate": required_fee_rate,
        }),
        _ => serde_json::Value::Null,
    }
}

fn error_response(context: &str, error: RbfError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("{}: {}", context, error);
    } else {
        tracing::warn!("{}: {}", context, error);
    }

    (
        status,
        Json(json!({
            "error": error.to_string(),
            "kind": error_kind(&error),
            "details": error_details(&error),
        })),
    )
        .into_response()
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "network": state.engine.config().network.to_string(),
    }))
}

pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let result = async {
        let address = state.engine.parse_address(&address)?;
        state.engine.balance(address).await
    }
    .await;

    match result {
        Ok(balance) => (StatusCode::OK, Json(balance)).into_response(),
        Err(e) => error_response("Error getting balance", e),
    }
}

pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(txid): Path<String>,
) -> impl IntoResponse {
    let result = async {
        let txid = state.engine.parse_txid(&txid)?;
        state.engine.transaction_details(txid).await
    }
    .await;

    match result {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => error_response("Error getting transaction", e),
    }
}

pub async fn get_fee_estimates(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.fee_estimates().await))
}

pub async fn create_transaction(
    State(state): State<ApiState>,
    Json(request): Json<CreateTransactionRequest>,
) -> impl IntoResponse {
    let result: RbfResult<_> = async {
        let key = state.engine.signing_key(&request.credential)?;
        let destination = state.engine.parse_address(&request.to_address)?;
        state
            .engine
            .create_transaction(
                &key,
                destination,
                Amount::from_sat(request.amount),
                request.fee_rate,
                request.rbf,
            )
            .await
    }
    .await;

    match result {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(e) => error_response("Error creating transaction", e),
    }
}

pub async fn replace_transaction(
    State(state): State<ApiState>,
    Json(request): Json<ReplaceTransactionRequest>,
) -> impl IntoResponse {
    let result: RbfResult<_> = async {
        let key = state.engine.signing_key(&request.credential)?;
        let original_txid = state.engine.parse_txid(&request.original_txid)?;
        state
            .engine
            .replace_transaction(
                &key,
                original_txid,
                request.new_fee_rate,
                ReplacementKind::from_cancel_flag(request.cancel),
            )
            .await
    }
    .await;

    match result {
        Ok(replacement) => (StatusCode::OK, Json(replacement)).into_response(),
        Err(e) => error_response("Error replacing transaction", e),
    }
}

pub async fn sweep(
    State(state): State<ApiState>,
    Json(request): Json<SweepRequest>,
) -> impl IntoResponse {
    let result: RbfResult<_> = async {
        let key = state.engine.signing_key(&request.credential)?;
        let source = state.engine.parse_address(&request.from_address)?;
        let destination = state.engine.parse_address(&request.to_address)?;
        state.engine.sweep(&key, source, destination).await
    }
    .await;

    match result {
        Ok(swept) => (StatusCode::OK, Json(swept)).into_response(),
        Err(e) => error_response("Error sweeping address", e),
    }
}

pub async fn broadcast(
    State(state): State<ApiState>,
    Json(request): Json<BroadcastRequest>,
) -> impl IntoResponse {
    match state.engine.broadcast(&request.tx_hex).await {
        Ok(txid) => (StatusCode::OK, Json(json!({ "txid": txid }))).into_response(),
        Err(e) => error_response("Error broadcasting transaction", e),
    }
}

pub async fn import_key(
    State(state): State<ApiState>,
    Json(request): Json<ImportKeyRequest>,
) -> impl IntoResponse {
    match state.engine.signing_key(&request.credential) {
        Ok(key) => (StatusCode::OK, Json(state.engine.derive_addresses(&key))).into_response(),
        Err(e) => error_response("Error importing key", e),
    }
}
