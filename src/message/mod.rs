// Control channel messages and their classification

use serde::{Deserialize, Serialize};


/// Kind used for button enable/disable instructions sent to the client
pub const KIND_HTML_CONTROL: &str = "htmlControl";

/// Element id of the client's "start engine" button
pub const START_ENGINE_ID: &str = "startEngine";

/// Element id of the client's "stop engine" button
pub const STOP_ENGINE_ID: &str = "stopEngine";

/// Placeholder used for absent kind/subtype before classification
const EMPTY: &str = "empty";

/// A control channel message, one per WebSocket frame.
///
/// Every field is optional on the wire and serializes as `null` when absent.
/// An empty string is a value, distinct from absence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "subtype", default)]
    sub_kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl Message {
    /// Create a message of the given kind with every other field absent
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Create a message from all four fields, each present
    pub fn from_parts(kind: &str, sub_kind: &str, text: &str, id: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            sub_kind: Some(sub_kind.to_string()),
            text: Some(text.to_string()),
            id: Some(id.to_string()),
        }
    }

    pub fn with_sub_kind(mut self, sub_kind: impl Into<String>) -> Self {
        self.sub_kind = Some(sub_kind.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// `status/info` message carrying human-readable text
    pub fn status_info(text: impl Into<String>) -> Self {
        Self::new("status").with_sub_kind("info").with_text(text)
    }

    /// `htmlControl` message toggling a single client element
    pub fn html_control(control: Toggle, element_id: &str) -> Self {
        Self::new(KIND_HTML_CONTROL)
            .with_sub_kind(control.as_str())
            .with_id(element_id)
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn sub_kind(&self) -> Option<&str> {
        self.sub_kind.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Resolve this message into the closed set of inbound commands
    pub fn classify(&self) -> Inbound {
        let kind = self.kind.as_deref().unwrap_or(EMPTY);
        let sub_kind = self.sub_kind.as_deref().unwrap_or(EMPTY);

        match kind {
            "status" => Inbound::Status(match sub_kind {
                "ready" => StatusEvent::Ready,
                "gone" => StatusEvent::Gone,
                other => StatusEvent::Other(other.to_string()),
            }),
            "formSubmit" => Inbound::FormSubmit {
                text: self.text.clone(),
            },
            "engineControl" => Inbound::EngineControl(match sub_kind {
                "start" => EngineCommand::Start,
                "stop" => EngineCommand::Stop,
                other => EngineCommand::Other(other.to_string()),
            }),
            other => Inbound::Unknown(other.to_string()),
        }
    }
}

/// Inbound message after kind/subtype resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Status(StatusEvent),
    FormSubmit { text: Option<String> },
    EngineControl(EngineCommand),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Client finished opening its socket and wants the current controls
    Ready,
    /// Client is going away
    Gone,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    /// Any other subtype; handled as a stop
    Other(String),
}

impl EngineCommand {
    pub fn as_str(&self) -> &str {
        match self {
            EngineCommand::Start => "start",
            EngineCommand::Stop => "stop",
            EngineCommand::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    pub fn as_str(self) -> &'static str {
        match self {
            Toggle::Enable => "enable",
            Toggle::Disable => "disable",
        }
    }
}
