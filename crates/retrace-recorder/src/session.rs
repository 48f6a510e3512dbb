//! Recorder session: converts captured events into actions, tracks secrets
//! and hover confirmation, and assembles the scenario on save.
//!
//! Lifecycle: idle -> recording -> paused <-> recording -> saved/cancelled.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use retrace_core::classifier;
use retrace_core::driver::DomInspector;
use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{
    Action, ActionPayload, DragEndpoint, InputModifier, KeyName, ParameterSpec, ParameterType,
    Scenario, SelectMode,
};
use retrace_core::optimizer;
use retrace_core::selector;

use crate::events::CapturedEvent;

/// Parameter name used for recorded file uploads.
const FILE_PATH_PARAM: &str = "filePath";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Paused,
    Saved,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetPlacement {
    pub x: f64,
    pub y: f64,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct HoverCandidate {
    element_id: u64,
    buffer_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PendingDrag {
    source: DragEndpoint,
    timestamp: i64,
}

/// The completed product of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecording {
    pub scenario: Scenario,
    pub secrets: BTreeMap<String, String>,
}

/// Durable image of a session, persisted on every change so page reloads
/// and host restarts do not interrupt a recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecorderSnapshot {
    pub state: RecorderState,
    pub entry_url: Option<String>,
    pub scenario_name: Option<String>,
    buffer: Vec<Action>,
    secrets: BTreeMap<String, String>,
    parameters: BTreeMap<String, ParameterSpec>,
    previous_values: BTreeMap<String, String>,
    hover_candidates: Vec<HoverCandidate>,
    pending_drag: Option<PendingDrag>,
    pub widget: Option<WidgetPlacement>,
    pub saved_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RecorderSession {
    state: RecorderState,
    entry_url: Option<String>,
    scenario_name: Option<String>,
    buffer: Vec<Action>,
    secrets: BTreeMap<String, String>,
    parameters: BTreeMap<String, ParameterSpec>,
    previous_values: BTreeMap<String, String>,
    hover_candidates: Vec<HoverCandidate>,
    pending_drag: Option<PendingDrag>,
    widget: Option<WidgetPlacement>,
}

impl RecorderSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording)
    }

    pub fn buffered_actions(&self) -> usize {
        self.buffer.len()
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            state: self.state,
            entry_url: self.entry_url.clone(),
            scenario_name: self.scenario_name.clone(),
            buffer: self.buffer.clone(),
            secrets: self.secrets.clone(),
            parameters: self.parameters.clone(),
            previous_values: self.previous_values.clone(),
            hover_candidates: self.hover_candidates.clone(),
            pending_drag: self.pending_drag.clone(),
            widget: self.widget.clone(),
            saved_at: Utc::now(),
        }
    }

    pub fn restore(snapshot: RecorderSnapshot) -> Self {
        Self {
            state: snapshot.state,
            entry_url: snapshot.entry_url,
            scenario_name: snapshot.scenario_name,
            buffer: snapshot.buffer,
            secrets: snapshot.secrets,
            parameters: snapshot.parameters,
            previous_values: snapshot.previous_values,
            hover_candidates: snapshot.hover_candidates,
            pending_drag: snapshot.pending_drag,
            widget: snapshot.widget,
        }
    }

    /// JSON pushed back into the page to restore widget state after a
    /// reload or reinjection.
    pub fn widget_state_json(&self) -> serde_json::Value {
        json!({
            "recording": matches!(self.state, RecorderState::Recording | RecorderState::Paused),
            "paused": matches!(self.state, RecorderState::Paused),
            "name": self.scenario_name,
            "x": self.widget.as_ref().map(|w| w.x),
            "y": self.widget.as_ref().map(|w| w.y),
            "collapsed": self.widget.as_ref().map(|w| w.collapsed).unwrap_or(false),
        })
    }

    /// Apply one captured event. Returns the finished recording when the
    /// event was a successful stop-and-save.
    pub async fn handle_event(
        &mut self,
        event: CapturedEvent,
        dom: &dyn DomInspector,
    ) -> Result<Option<SavedRecording>> {
        match event {
            CapturedEvent::Start { url, .. } => {
                if self.is_recording() {
                    return Err(RetraceError::validation("Recording already in progress"));
                }
                self.reset();
                self.state = RecorderState::Recording;
                self.entry_url = Some(url);
                Ok(None)
            }
            CapturedEvent::Pause { .. } => {
                if self.is_recording() {
                    self.state = RecorderState::Paused;
                }
                Ok(None)
            }
            CapturedEvent::Resume { .. } => {
                if self.state == RecorderState::Paused {
                    self.state = RecorderState::Recording;
                }
                Ok(None)
            }
            CapturedEvent::Cancel { .. } => {
                self.reset();
                self.state = RecorderState::Cancelled;
                Ok(None)
            }
            CapturedEvent::Widget { x, y, collapsed, .. } => {
                self.widget = Some(WidgetPlacement { x, y, collapsed });
                Ok(None)
            }
            CapturedEvent::Save { name, url, .. } => self.save(name, url).map(Some),
            interaction => {
                if self.state != RecorderState::Recording {
                    return Ok(None);
                }
                self.handle_interaction(interaction, dom).await?;
                Ok(None)
            }
        }
    }

    async fn handle_interaction(
        &mut self,
        event: CapturedEvent,
        dom: &dyn DomInspector,
    ) -> Result<()> {
        match event {
            CapturedEvent::Click {
                element,
                marker,
                element_id,
                ancestor_ids,
                text,
                href,
                timestamp,
            } => {
                self.confirm_hovers(element_id, &ancestor_ids);
                let spec = selector::synthesize(&element, &marker, dom).await?;
                // Anchor navigations settle before the next recorded step.
                let requires_wait = href.is_some();
                self.buffer.push(Action::new(
                    ActionPayload::Click {
                        text,
                        href,
                        requires_wait,
                    },
                    Some(spec),
                    timestamp,
                ));
            }
            CapturedEvent::Input {
                element,
                marker,
                field,
                form,
                value,
                timestamp,
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                let previous = self.previous_values.get(&spec.primary);
                let clear_first = previous.map(String::is_empty).unwrap_or(false);
                self.previous_values
                    .insert(spec.primary.clone(), value.clone());

                let classification = classifier::classify(&field, form.as_ref());
                let (text, is_secret, param_name) = if classification.is_secret {
                    let name = classification
                        .parameter_name
                        .unwrap_or_else(|| "secret".to_string());
                    self.secrets.insert(name.clone(), value);
                    self.parameters
                        .insert(name.clone(), ParameterSpec::required_secret());
                    (format!("{{{{{}}}}}", name), true, Some(name))
                } else {
                    (value, false, None)
                };

                self.buffer.push(Action::new(
                    ActionPayload::Type {
                        text,
                        is_secret,
                        param_name,
                        clear_first,
                    },
                    Some(spec),
                    timestamp,
                ));
            }
            CapturedEvent::SelectChange {
                element,
                marker,
                value,
                label,
                timestamp,
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                self.buffer.push(Action::new(
                    ActionPayload::Select(SelectMode::Native { value, label }),
                    Some(spec),
                    timestamp,
                ));
            }
            CapturedEvent::FileSelect {
                element,
                marker,
                filename,
                timestamp,
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                self.parameters.insert(
                    FILE_PATH_PARAM.to_string(),
                    ParameterSpec {
                        param_type: ParameterType::File,
                        required: true,
                        default: filename.map(serde_json::Value::from),
                        description: None,
                        secret: false,
                    },
                );
                self.buffer.push(Action::new(
                    ActionPayload::Upload {
                        file_path: format!("{{{{{}}}}}", FILE_PATH_PARAM),
                    },
                    Some(spec),
                    timestamp,
                ));
            }
            CapturedEvent::Scroll {
                element,
                marker,
                x,
                y,
                timestamp,
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                self.buffer.push(Action::new(
                    ActionPayload::Scroll { x, y },
                    Some(spec),
                    timestamp,
                ));
            }
            CapturedEvent::Hover {
                element,
                marker,
                element_id,
                timestamp,
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                self.hover_candidates.push(HoverCandidate {
                    element_id,
                    buffer_index: self.buffer.len(),
                });
                self.buffer.push(Action::hover(spec, timestamp));
            }
            CapturedEvent::Keydown {
                key,
                modifiers,
                timestamp,
            } => {
                let Some(key) = parse_key(&key) else {
                    debug!(key = %key, "ignoring non-special key");
                    return Ok(());
                };
                self.buffer.push(Action::new(
                    ActionPayload::Keypress {
                        key,
                        modifiers: parse_modifiers(&modifiers),
                    },
                    None,
                    timestamp,
                ));
            }
            CapturedEvent::DragStart {
                element,
                marker,
                timestamp,
                ..
            } => {
                let spec = selector::synthesize(&element, &marker, dom).await?;
                self.pending_drag = Some(PendingDrag {
                    source: DragEndpoint::Selector { selector: spec },
                    timestamp,
                });
            }
            CapturedEvent::DragEnd {
                element,
                marker,
                x,
                y,
                timestamp,
            } => {
                let Some(pending) = self.pending_drag.take() else {
                    warn!("drag end without a matching drag start");
                    return Ok(());
                };
                let target = match (element, marker) {
                    (Some(element), Some(marker)) => DragEndpoint::Selector {
                        selector: selector::synthesize(&element, &marker, dom).await?,
                    },
                    _ => DragEndpoint::Point { x, y },
                };
                self.buffer.push(Action::new(
                    ActionPayload::Drag {
                        source: pending.source,
                        target,
                    },
                    None,
                    timestamp,
                ));
            }
            // Lifecycle events are handled by the caller.
            _ => {}
        }
        Ok(())
    }

    /// A click on the hovered element or any of up to three ancestors marks
    /// the hover as purposeful.
    fn confirm_hovers(&mut self, element_id: u64, ancestor_ids: &[u64]) {
        self.hover_candidates.retain(|candidate| {
            !(candidate.element_id == element_id
                || ancestor_ids.iter().take(3).any(|id| *id == candidate.element_id))
        });
    }

    fn save(&mut self, name: String, exit_url: String) -> Result<SavedRecording> {
        if !matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            return Err(RetraceError::validation("No recording in progress"));
        }
        if name.trim().is_empty() {
            return Err(RetraceError::validation("Scenario name is required"));
        }

        // Hovers never confirmed by a click are dropped.
        let unconfirmed: Vec<usize> = self
            .hover_candidates
            .iter()
            .map(|candidate| candidate.buffer_index)
            .collect();
        let raw: Vec<Action> = self
            .buffer
            .iter()
            .enumerate()
            .filter(|(index, _)| !unconfirmed.contains(index))
            .map(|(_, action)| action.clone())
            .collect();

        let mut scenario = Scenario::new(name.trim(), Utc::now());
        scenario.metadata.entry_url = self.entry_url.clone();
        scenario.metadata.exit_url = Some(exit_url);
        scenario.metadata.parameters = self.parameters.clone();
        scenario.chain = optimizer::optimize(raw);

        let secrets = self.secrets.clone();
        self.scenario_name = Some(scenario.name.clone());
        self.state = RecorderState::Saved;

        Ok(SavedRecording { scenario, secrets })
    }

    fn reset(&mut self) {
        let widget = self.widget.clone();
        *self = Self::default();
        self.widget = widget;
    }
}

fn parse_key(key: &str) -> Option<KeyName> {
    match key {
        "Enter" => Some(KeyName::Enter),
        "Escape" => Some(KeyName::Escape),
        "Tab" => Some(KeyName::Tab),
        "ArrowUp" => Some(KeyName::ArrowUp),
        "ArrowDown" => Some(KeyName::ArrowDown),
        "ArrowLeft" => Some(KeyName::ArrowLeft),
        "ArrowRight" => Some(KeyName::ArrowRight),
        _ => None,
    }
}

fn parse_modifiers(modifiers: &[String]) -> Vec<InputModifier> {
    modifiers
        .iter()
        .filter_map(|modifier| match modifier.as_str() {
            "control" => Some(InputModifier::Control),
            "shift" => Some(InputModifier::Shift),
            "alt" => Some(InputModifier::Alt),
            "meta" => Some(InputModifier::Meta),
            _ => None,
        })
        .collect()
}
