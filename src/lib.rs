pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod types;

// Layered boundaries: use cases and ports, adapters behind them
pub mod app;
pub mod infra;
