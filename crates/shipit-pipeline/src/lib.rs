//! Single-pass release pipeline orchestration for shipit.
//!
//! Wires the credential broker, release host, image publisher, and
//! deployer into one forward-only run with cancellation observed at
//! stage boundaries.

pub mod orchestrator;
pub mod plan;

pub use orchestrator::{CancelSignal, PipelineEvent, PipelineOrchestrator, RunReport, Transition};
pub use plan::RunPlan;
