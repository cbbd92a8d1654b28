pub mod bitcoin;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use self::bitcoin::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(bitcoin::health))
        // Lookups
        .route("/api/bitcoin/balance/:address", get(bitcoin::get_balance))
        .route("/api/bitcoin/transaction/:txid", get(bitcoin::get_transaction))
        .route("/api/bitcoin/fee-estimates", get(bitcoin::get_fee_estimates))
        // Build, replace, sweep
        .route("/api/bitcoin/create-transaction", post(bitcoin::create_transaction))
        .route("/api/bitcoin/replace-transaction", post(bitcoin::replace_transaction))
        .route("/api/bitcoin/sweep", post(bitcoin::sweep))
        // Broadcast and keys
        .route("/api/bitcoin/broadcast", post(bitcoin::broadcast))
        .route("/api/bitcoin/import-key", post(bitcoin::import_key))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
