// Control channel runtime: message queues, dispatcher and engine state

mod dispatcher;
pub mod heartbeat;

pub use dispatcher::{DispatchError, FormSubmission};
pub use heartbeat::{EngineLoop, Heartbeat};

use crate::config::ControlConfig;
use crate::message::Message;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Engine run/stop flag shared by the dispatcher and the engine loop
#[derive(Debug)]
pub struct EngineState {
    running: AtomicBool,
}

impl EngineState {
    /// The engine starts out running
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the flag, returning the previous value
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue failures surfaced to the caller of a bounded send
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no consumer within {0:?}, message dropped")]
    Timeout(Duration),
    #[error("no client connected, message dropped")]
    NoConnection,
    #[error("control channel closed")]
    Closed,
}

/// In-process message bus between transports and the engine.
///
/// Every connected transport owns a bounded outbound queue obtained from
/// `subscribe`; `publish` copies each message into every live queue, so a
/// connection sees messages in send order. The inbound side is one bounded
/// queue drained by a single dispatcher, so state transitions are
/// serialized. Every send waits at most `send_timeout`.
pub struct ControlChannel {
    engine: Arc<EngineState>,
    outbound: Mutex<Vec<mpsc::Sender<Message>>>,
    inbound_tx: mpsc::Sender<Message>,
    inbound_rx: Mutex<mpsc::Receiver<Message>>,
    queue_capacity: usize,
    send_timeout: Duration,
}

impl ControlChannel {
    pub fn new(config: &ControlConfig) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_capacity);

        Self {
            engine: Arc::new(EngineState::new()),
            outbound: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            queue_capacity,
            send_timeout: config.send_timeout(),
        }
    }

    /// Shared engine state, for the engine loop and read-only APIs
    pub fn engine(&self) -> Arc<EngineState> {
        Arc::clone(&self.engine)
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Open an outbound queue for one connection.
    ///
    /// Only messages published after this call are delivered. Dropping the
    /// receiver unsubscribes, discarding anything still buffered in it.
    pub async fn subscribe(&self) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut outbound = self.outbound.lock().await;
        outbound.retain(|tx| !tx.is_closed());
        outbound.push(tx);
        debug!(connections = outbound.len(), "Outbound queue opened");
        rx
    }

    /// Queue a message for delivery to every connected client.
    ///
    /// Each queue waits at most `send_timeout`; a queue that stays full drops
    /// the message. With no connection the message is dropped at once. The
    /// error is informational.
    pub async fn publish(&self, msg: Message) -> Result<(), ControlError> {
        let queues: Vec<mpsc::Sender<Message>> = {
            let mut outbound = self.outbound.lock().await;
            outbound.retain(|tx| !tx.is_closed());
            outbound.clone()
        };

        if queues.is_empty() {
            debug!(
                kind = ?msg.kind(),
                subtype = ?msg.sub_kind(),
                "No client connected, dropping outbound message"
            );
            return Err(ControlError::NoConnection);
        }

        let send_timeout = self.send_timeout;
        let sends = queues.into_iter().map(move |tx| {
            let msg = msg.clone();
            async move { tx.send_timeout(msg, send_timeout).await }
        });

        let mut timed_out = 0;
        let mut delivered = 0;
        for result in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Timeout(msg)) => {
                    timed_out += 1;
                    warn!(
                        kind = ?msg.kind(),
                        subtype = ?msg.sub_kind(),
                        timeout_ms = send_timeout.as_millis() as u64,
                        "Client did not drain outbound message, dropping it"
                    );
                }
                // Connection went away while we were sending
                Err(SendTimeoutError::Closed(_)) => {}
            }
        }

        if timed_out > 0 {
            Err(ControlError::Timeout(send_timeout))
        } else if delivered == 0 {
            Err(ControlError::NoConnection)
        } else {
            Ok(())
        }
    }

    /// Queue a message received from a client for the dispatcher
    pub async fn submit(&self, msg: Message) -> Result<(), ControlError> {
        match self.inbound_tx.send_timeout(msg, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(msg)) => {
                warn!(
                    kind = ?msg.kind(),
                    subtype = ?msg.sub_kind(),
                    "Dispatcher did not accept inbound message, dropping it"
                );
                Err(ControlError::Timeout(self.send_timeout))
            }
            Err(SendTimeoutError::Closed(_)) => Err(ControlError::Closed),
        }
    }

    /// Drain the inbound queue, dispatching messages one at a time.
    ///
    /// Runs until the channel is dropped. Only one dispatcher makes progress.
    pub async fn run_dispatcher(&self) {
        let mut inbound = self.inbound_rx.lock().await;
        info!("Dispatcher started");

        while let Some(msg) = inbound.recv().await {
            debug!(kind = ?msg.kind(), subtype = ?msg.sub_kind(), "Dispatching message");
            if let Err(e) = self.dispatch(msg).await {
                warn!(error = %e, "Dropped inbound message");
            }
        }

        info!("Dispatcher stopped");
    }
}
