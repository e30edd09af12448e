pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;

// Ports and use cases, with their adapters
pub mod app;
pub mod infra;
