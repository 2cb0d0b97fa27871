//! Sarafi Worker
//!
//! Background process that retries profit calculation for transactions
//! recorded while no market rate was available.

pub mod config;
pub mod recompute;
pub mod telemetry;

pub use config::{LogFormat, WorkerConfig};
pub use recompute::RecomputeLoop;
pub use telemetry::init_tracing;
