//! Wires `game_session`'s transport-agnostic reader/writer traits to
//! `axum::extract::ws`, the way a top-level binary wires its own socket
//! layer to a game-agnostic service trait.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use game_session::{InboundFrame, TransportError, TransportReader, TransportWriter};

pub struct AxumReader(pub SplitStream<WebSocket>);

#[async_trait]
impl TransportReader for AxumReader {
    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            return match self.0.next().await? {
                Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text))),
                Ok(Message::Pong(_)) => Some(Ok(InboundFrame::Pong)),
                Ok(Message::Ping(_)) | Ok(Message::Binary(_)) => continue,
                Ok(Message::Close(_)) => None,
                Err(err) => Some(Err(TransportError(err.to_string()))),
            };
        }
    }
}

pub struct AxumWriter(pub SplitSink<WebSocket, Message>);

#[async_trait]
impl TransportWriter for AxumWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.0
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        let _ = self.0.send(Message::Close(None)).await;
        Ok(())
    }
}
