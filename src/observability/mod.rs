// Observability: metrics recorded by the harvesting pipeline

pub mod metrics;

pub use metrics::{init_metrics, push_to_gateway, render};
