use super::ControlChannel;
use crate::message::{
    EngineCommand, Inbound, Message, StatusEvent, Toggle, START_ENGINE_ID, STOP_ENGINE_ID,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Inbound messages that cannot be acted on
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("formSubmit text {text:?} is not a destination|agent pair")]
    MalformedFormSubmit { text: String },
}

/// Destination cube and agent chosen on the engine form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub destination: String,
    pub agent: String,
}

impl FormSubmission {
    /// Parse `"<destination>|<agent>"`.
    ///
    /// Absent text selects nothing: both fields become the nil UUID.
    pub fn parse(text: Option<&str>) -> Result<Self, DispatchError> {
        let Some(text) = text else {
            let nil = Uuid::nil().to_string();
            return Ok(Self {
                destination: nil.clone(),
                agent: nil,
            });
        };

        let mut fields = text.split('|');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(destination), Some(agent), None) => Ok(Self {
                destination: destination.to_string(),
                agent: agent.to_string(),
            }),
            _ => Err(DispatchError::MalformedFormSubmit {
                text: text.to_string(),
            }),
        }
    }
}

/// Button states matching the engine flag
fn control_pair(running: bool) -> [Message; 2] {
    if running {
        [
            Message::html_control(Toggle::Disable, START_ENGINE_ID),
            Message::html_control(Toggle::Enable, STOP_ENGINE_ID),
        ]
    } else {
        [
            Message::html_control(Toggle::Enable, START_ENGINE_ID),
            Message::html_control(Toggle::Disable, STOP_ENGINE_ID),
        ]
    }
}

impl ControlChannel {
    /// Act on a single inbound message.
    ///
    /// Emissions go through `publish`; a dropped emission is logged there and
    /// does not fail the dispatch.
    pub async fn dispatch(&self, msg: Message) -> Result<(), DispatchError> {
        match msg.classify() {
            Inbound::Status(StatusEvent::Ready) => {
                let running = self.engine.is_running();
                info!(running, "Client ready, sending engine controls");
                self.emit_all(control_pair(running)).await;
            }
            Inbound::Status(StatusEvent::Gone) => {
                info!("Client went away, engine continues on its own");
            }
            Inbound::Status(StatusEvent::Other(sub_kind)) => {
                info!(subtype = %sub_kind, "Ignoring unknown status message");
            }
            Inbound::FormSubmit { text } => {
                let form = FormSubmission::parse(text.as_deref())?;
                info!(destination = %form.destination, agent = %form.agent, "Form submitted");
                self.emit(Message::status_info(format!(
                    "Received '{}|{}'<br />",
                    form.destination, form.agent
                )))
                .await;
            }
            Inbound::EngineControl(command) => {
                let running = matches!(command, EngineCommand::Start);
                let was_running = self.engine.set_running(running);
                info!(command = command.as_str(), was_running, running, "Engine control");

                self.emit_all(control_pair(running)).await;
                self.emit(Message::status_info(format!(
                    "Engine {}<br />",
                    command.as_str()
                )))
                .await;
            }
            Inbound::Unknown(kind) => {
                warn!(kind = %kind, "Unknown message type");
            }
        }

        Ok(())
    }

    async fn emit(&self, msg: Message) {
        // Timeouts are already logged by publish
        let _ = self.publish(msg).await;
    }

    async fn emit_all(&self, msgs: impl IntoIterator<Item = Message>) {
        for msg in msgs {
            self.emit(msg).await;
        }
    }
}
