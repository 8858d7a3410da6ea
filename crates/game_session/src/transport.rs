use async_trait::async_trait;
use std::fmt;

/// One frame a [`TransportReader`] can produce. Transports that auto-answer
/// pings at a lower layer never surface them here; only data the reader loop
/// actually needs to act on does.
#[derive(Debug)]
pub enum InboundFrame {
    Text(String),
    Pong,
}

#[derive(Debug)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for TransportError {}

/// The read half of a connected session's transport. A concrete adapter
/// (e.g. one wrapping `axum::extract::ws::WebSocket`'s split stream) lives
/// outside this crate so the core never depends on a specific HTTP stack.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// The write half of a connected session's transport.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn send_ping(&mut self) -> Result<(), TransportError>;
    async fn send_close(&mut self) -> Result<(), TransportError>;
}
