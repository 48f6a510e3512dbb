//! Replay engine for retrace: dependency resolution over the scenario
//! graph, conditional execution, parameter and secret substitution, and
//! per-action playback with retry, fallback recovery, and structured
//! diagnostics.

pub mod condition;
pub mod context;
pub mod executor;
pub mod graph;
pub mod settle;
pub mod substitute;

#[cfg(test)]
mod test_support;

pub use context::ExecutionContext;
pub use executor::{ExecutionReport, ExecutorConfig, ScenarioExecutor};
pub use graph::{DependencyResolver, PlannedScenario};
pub use settle::SettlementConfig;
