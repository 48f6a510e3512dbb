mod execute;
mod library;
mod recorder;
mod transfer;

pub use execute::ExecuteScenarioTool;
pub use library::{DeleteScenarioTool, GetScenarioInfoTool, ListScenariosTool, SearchScenariosTool};
pub use recorder::EnableRecorderTool;
pub use transfer::{ExportScenarioTool, ImportScenarioTool};
