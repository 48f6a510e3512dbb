//! File-based persistence for scenarios and their secrets.
//!
//! Scenario documents are shareable; secret values live in a sibling
//! directory whose gitignore sentinel keeps them out of source control.

mod secrets;
mod store;

pub use secrets::SecretStore;
pub use store::{ScenarioStore, SearchQuery, StoreStats, ValidationReport};
