pub mod aggregate;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod poll;
