//! Server-side websocket wire protocol spoken with subscribers.

pub mod websocket;

pub use websocket::{ClientCommand, ConnectionHandle, ServerFrame, WsConnection};
