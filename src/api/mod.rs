// HTTP and WebSocket APIs

pub mod engine;
pub mod websocket;

pub use engine::{create_engine_router, EngineAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};
