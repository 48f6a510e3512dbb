//! Canonical data shapes shared by the recorder, optimiser, storage, and
//! executor.

mod action;
mod diagnostic;
mod index;
mod scenario;
mod selector;

pub use action::{
    Action, ActionPayload, DragEndpoint, InputModifier, KeyName, SelectMode, WaitMode, WaitUntil,
};
pub use diagnostic::{
    AttemptRecord, BoundingBox, ElementStateSnapshot, PageContext, PlaybackFailure,
};
pub use index::{IndexEntry, ScenarioIndex};
pub use scenario::{
    DependencyRef, Guard, GuardCheck, OutputBinding, ParameterSpec, ParameterType, Scenario,
    ScenarioMetadata, SCENARIO_VERSION,
};
pub use selector::{ElementInfo, ParentInfo, SelectorSpec};
