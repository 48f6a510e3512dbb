//! Host side of the recorder: wires bridge events into the session, keeps
//! the durable snapshot current, reinjects across navigations, and lands
//! saved scenarios in storage.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use retrace_core::driver::{BridgeEvent, DomInspector, HostBridge};
use retrace_core::error::Result;

use retrace_storage::ScenarioStore;

use crate::events::CapturedEvent;
use crate::script::{CAPTURE_BINDING, build_capture_script};
use crate::session::{RecorderSession, RecorderState, SavedRecording};
use crate::store::RecorderStore;

pub struct RecorderHost {
    bridge: Arc<dyn HostBridge>,
    dom: Arc<dyn DomInspector>,
    scenarios: Arc<ScenarioStore>,
    snapshots: RecorderStore,
    session: RecorderSession,
    origin: String,
}

impl RecorderHost {
    pub fn new(
        bridge: Arc<dyn HostBridge>,
        dom: Arc<dyn DomInspector>,
        scenarios: Arc<ScenarioStore>,
        snapshots: RecorderStore,
    ) -> Self {
        Self {
            bridge,
            dom,
            scenarios,
            snapshots,
            session: RecorderSession::new(),
            origin: String::new(),
        }
    }

    /// Expose the capture binding, inject the capture script into the
    /// current and all future documents, and restore any in-progress
    /// recording for this origin.
    pub async fn enable(&mut self) -> Result<()> {
        self.bridge.expose_binding(CAPTURE_BINDING).await?;
        self.bridge.inject(&build_capture_script()).await?;

        self.origin = self.current_origin().await;
        if let Some(snapshot) = self.snapshots.get(&self.origin)? {
            info!(origin = %self.origin, "restoring in-progress recording");
            self.session = RecorderSession::restore(snapshot);
            self.push_widget_state().await;
        }
        Ok(())
    }

    /// Consume bridge events until the page goes away.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(event) = self.bridge.next_event().await? {
            match event {
                BridgeEvent::BindingCalled { name, payload } => {
                    if name != CAPTURE_BINDING {
                        continue;
                    }
                    self.handle_payload(&payload).await;
                }
                BridgeEvent::MainFrameNavigated { url } => {
                    let origin = origin_of(&url);
                    if origin != self.origin {
                        debug!(from = %self.origin, to = %origin, "main frame changed origin");
                        self.origin = origin;
                    }
                }
                BridgeEvent::Loaded => {
                    // The capture script reinstalls itself on every new
                    // document; only the widget state needs pushing back.
                    self.push_widget_state().await;
                }
            }
        }
        Ok(())
    }

    async fn handle_payload(&mut self, payload: &str) {
        let event = match CapturedEvent::parse(payload) {
            Ok(event) => event,
            Err(error) => {
                warn!("discarding malformed capture payload: {}", error);
                return;
            }
        };

        if matches!(event, CapturedEvent::Start { .. })
            && let Err(error) = self.snapshots.unlock(&self.origin)
        {
            warn!("failed to lift clearing sentinel: {}", error);
        }

        match self.session.handle_event(event, self.dom.as_ref()).await {
            Ok(Some(recording)) => self.finish_recording(recording).await,
            Ok(None) => self.persist_state(),
            Err(error) => {
                warn!("recorder event rejected: {}", error);
            }
        }
    }

    async fn finish_recording(&mut self, recording: SavedRecording) {
        let SavedRecording { scenario, secrets } = recording;
        let name = scenario.name.clone();
        let secrets = if secrets.is_empty() {
            None
        } else {
            Some(secrets)
        };

        match self.scenarios.save(scenario, secrets.as_ref()) {
            Ok(_) => {
                info!(scenario = %name, "recording saved");
                if let Err(error) = self.snapshots.set_clearing(&self.origin) {
                    warn!("failed to set clearing sentinel: {}", error);
                }
            }
            Err(error) => warn!(scenario = %name, "failed to persist recording: {}", error),
        }
        self.push_widget_state().await;
    }

    fn persist_state(&mut self) {
        match self.session.state() {
            RecorderState::Cancelled => {
                if let Err(error) = self.snapshots.discard(&self.origin) {
                    warn!("failed to discard recording snapshot: {}", error);
                }
            }
            RecorderState::Idle | RecorderState::Saved => {}
            _ => {
                if let Err(error) = self.snapshots.put(&self.origin, &self.session.snapshot()) {
                    warn!("failed to persist recording snapshot: {}", error);
                }
            }
        }
    }

    async fn push_widget_state(&self) {
        let state = self.session.widget_state_json();
        let expression = format!(
            "window.__retraceRecorder && window.__retraceRecorder.setState({})",
            state
        );
        if let Err(error) = self.bridge.eval_in_page(&expression).await {
            debug!("widget state push failed: {}", error);
        }
    }

    async fn current_origin(&self) -> String {
        match self.bridge.eval_in_page("location.origin").await {
            Ok(Value::String(origin)) => origin,
            _ => String::new(),
        }
    }
}

/// scheme://host[:port] prefix of a URL.
fn origin_of(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    match rest.find('/') {
        Some(path_start) => url[..scheme_end + 3 + path_start].to_string(),
        None => url.to_string(),
    }
}
