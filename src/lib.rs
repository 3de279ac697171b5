// Control channel messages
pub mod message;

// Message queues, dispatcher and engine loop
pub mod control;

// Entity registry access
pub mod registry;

// Periodic liveness checks
pub mod sweeper;

// HTTP and WebSocket APIs
pub mod api;

// Configuration loading
pub mod config;

pub use control::{ControlChannel, EngineState};
pub use message::Message;
