//! Operator HTTP surface and worker process wiring.

pub mod api;
pub mod metrics;
pub mod state;
