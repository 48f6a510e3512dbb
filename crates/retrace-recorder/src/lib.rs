//! In-page recording for retrace: the injected capture script, the host-side
//! session state machine, durable recording snapshots, and the bridge-event
//! loop that ties them together.

mod events;
mod host;
mod script;
mod session;
mod store;

pub use events::CapturedEvent;
pub use host::RecorderHost;
pub use script::{CAPTURE_BINDING, build_capture_script};
pub use session::{
    RecorderSession, RecorderSnapshot, RecorderState, SavedRecording, WidgetPlacement,
};
pub use store::RecorderStore;
