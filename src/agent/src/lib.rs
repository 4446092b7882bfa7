pub mod client;
pub mod error;
pub mod strategy;
