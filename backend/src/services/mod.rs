pub mod chain;
pub mod onchain;
