pub mod requests;
pub mod transaction;
