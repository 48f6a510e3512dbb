//! Replayable action variants.
//!
//! Actions form a closed set; the tagged representation keeps optimiser
//! passes pattern-matchable and executor dispatch exhaustive. The document
//! shape is `{ "type": ..., "data": ..., "selector"?: ..., "timestamp": ... }`.

use serde::{Deserialize, Serialize};

use super::selector::SelectorSpec;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyName {
    Enter,
    Escape,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl KeyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Escape => "Escape",
            Self::Tab => "Tab",
            Self::ArrowUp => "ArrowUp",
            Self::ArrowDown => "ArrowDown",
            Self::ArrowLeft => "ArrowLeft",
            Self::ArrowRight => "ArrowRight",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputModifier {
    Alt,
    Control,
    Meta,
    Shift,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
    Commit,
}

/// How a select action drives the control: a native `<select>` value, or a
/// recorded open-then-pick step sequence for custom dropdown widgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectMode {
    Native {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Custom { steps: Vec<Action> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WaitMode {
    Duration { ms: u64 },
    Selector { selector: String, timeout_ms: u64 },
}

/// One end of a drag: a recorded selector or raw viewport coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DragEndpoint {
    Selector { selector: SelectorSpec },
    Point { x: f64, y: f64 },
}

/// Kind-specific payload of an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ActionPayload {
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        href: Option<String>,
        /// Request post-click settlement before the next action.
        #[serde(default)]
        requires_wait: bool,
    },
    Type {
        /// May contain `{{param}}` placeholders; never a secret literal.
        text: String,
        #[serde(default)]
        is_secret: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        param_name: Option<String>,
        #[serde(default)]
        clear_first: bool,
    },
    Select(SelectMode),
    Scroll { x: f64, y: f64 },
    Hover {},
    Keypress {
        key: KeyName,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<InputModifier>,
    },
    Wait(WaitMode),
    Upload {
        /// May be a `{{param}}` placeholder.
        file_path: String,
    },
    Drag {
        source: DragEndpoint,
        target: DragEndpoint,
    },
    Navigate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_until: Option<WaitUntil>,
    },
    /// No recorder path emits extract; it is authored directly in scenario
    /// documents and binds its result into a named output.
    Extract {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
        #[serde(default)]
        multiple: bool,
        output: String,
    },
}

/// A single replayable step. The timestamp orders actions during
/// optimisation and has no replay meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(flatten)]
    pub payload: ActionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorSpec>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Action {
    pub fn new(payload: ActionPayload, selector: Option<SelectorSpec>, timestamp: i64) -> Self {
        Self {
            payload,
            selector,
            timestamp,
        }
    }

    pub fn click(selector: SelectorSpec, timestamp: i64) -> Self {
        Self::new(
            ActionPayload::Click {
                text: None,
                href: None,
                requires_wait: false,
            },
            Some(selector),
            timestamp,
        )
    }

    pub fn type_text(selector: SelectorSpec, text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(
            ActionPayload::Type {
                text: text.into(),
                is_secret: false,
                param_name: None,
                clear_first: false,
            },
            Some(selector),
            timestamp,
        )
    }

    pub fn hover(selector: SelectorSpec, timestamp: i64) -> Self {
        Self::new(ActionPayload::Hover {}, Some(selector), timestamp)
    }

    pub fn wait_ms(ms: u64, timestamp: i64) -> Self {
        Self::new(
            ActionPayload::Wait(WaitMode::Duration { ms }),
            None,
            timestamp,
        )
    }

    pub fn kind(&self) -> &'static str {
        match &self.payload {
            ActionPayload::Click { .. } => "click",
            ActionPayload::Type { .. } => "type",
            ActionPayload::Select(_) => "select",
            ActionPayload::Scroll { .. } => "scroll",
            ActionPayload::Hover {} => "hover",
            ActionPayload::Keypress { .. } => "keypress",
            ActionPayload::Wait(_) => "wait",
            ActionPayload::Upload { .. } => "upload",
            ActionPayload::Drag { .. } => "drag",
            ActionPayload::Navigate { .. } => "navigate",
            ActionPayload::Extract { .. } => "extract",
        }
    }

    /// Primary selector string, when the action targets a selector.
    pub fn primary_selector(&self) -> Option<&str> {
        self.selector.as_ref().map(|s| s.primary.as_str())
    }

    /// The selector the executor's retry/fallback recovery operates on.
    /// For drag actions this is the source endpoint's selector.
    pub fn recovery_selector(&self) -> Option<&SelectorSpec> {
        if let ActionPayload::Drag { source, .. } = &self.payload
            && let DragEndpoint::Selector { selector } = source
        {
            return Some(selector);
        }
        self.selector.as_ref()
    }

    pub fn recovery_selector_mut(&mut self) -> Option<&mut SelectorSpec> {
        if let ActionPayload::Drag { source, .. } = &mut self.payload
            && let DragEndpoint::Selector { selector } = source
        {
            return Some(selector);
        }
        self.selector.as_mut()
    }
}
