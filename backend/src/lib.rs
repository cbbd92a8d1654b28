pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::EngineConfig;
pub use error::{ChainError, RbfError, RbfResult};
pub use services::onchain::RbfEngine;
