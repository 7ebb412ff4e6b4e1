use thiserror::Error;

/// Errors produced while speaking the websocket wire protocol.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to serialise outgoing frame: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("received non text/binary websocket frame")]
    UnsupportedFrame,

    #[error("malformed subscriber command: {0}")]
    MalformedCommand(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("topic '{topic}' expects {expected} parameter(s), got {got}")]
    BadParamArity {
        topic: String,
        expected: &'static str,
        got: usize,
    },

    #[error("topic '{topic}' does not accept parameter value '{value}'")]
    BadParamValue { topic: String, value: String },

    #[error("write to subscriber timed out")]
    WriteTimeout,

    #[error("subscriber connection closed")]
    ConnectionClosed,
}
