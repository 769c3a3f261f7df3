// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The physical change-stream connection.
//!
//! Every channel is multiplexed over one [`Transport`]. The realtime driver
//! only talks to the trait, so tests swap in a scripted server.

use std::future::Future;
use std::pin::Pin;

use fieldops_core::protocol::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded. The connection stays usable.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One multiplexed connection carrying every channel's frames.
pub trait Transport: Send + Sync {
    fn connect(&mut self, url: &str) -> BoxFuture<'_, TransportResult<()>>;

    /// Close the connection. A no-op when not connected.
    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>>;

    fn send(&mut self, frame: ClientFrame) -> BoxFuture<'_, TransportResult<()>>;

    /// Next frame from the server, `None` once the server closed the
    /// connection. Must be cancel safe: the driver polls it inside `select!`.
    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<ServerFrame>>>;

    fn is_connected(&self) -> bool;
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What one WebSocket message means for the change stream.
#[derive(Debug)]
pub(crate) enum Incoming {
    Frame(ServerFrame),
    Closed,
    /// Control traffic handled by tungstenite itself.
    Skip,
}

pub(crate) fn decode(message: Message) -> TransportResult<Incoming> {
    let text = match message {
        Message::Text(text) => text.as_str().to_owned(),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|e| TransportError::SerializationError(e.to_string()))?,
        Message::Close(_) => return Ok(Incoming::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(Incoming::Skip),
    };
    ServerFrame::from_json(&text)
        .map(Incoming::Frame)
        .map_err(|e| TransportError::SerializationError(e.to_string()))
}

/// [`Transport`] over tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketTransport {
    ws: Option<WsStream>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a connection that failed mid-operation.
    fn lost<T>(&mut self, err: TransportError) -> TransportResult<T> {
        debug!(error = %err, "change stream lost");
        self.ws = None;
        Err(err)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> BoxFuture<'_, TransportResult<()>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            debug!(url = %url, "change stream connected");
            self.ws = Some(ws);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if let Some(mut ws) = self.ws.take() {
                if let Err(e) = ws.close(None).await {
                    debug!(error = %e, "error closing change stream");
                }
            }
            Ok(())
        })
    }

    fn send(&mut self, frame: ClientFrame) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let json = frame
                .to_json()
                .map_err(|e| TransportError::SerializationError(e.to_string()))?;
            let Some(ws) = self.ws.as_mut() else {
                return Err(TransportError::ConnectionClosed);
            };
            trace!(frame = %json, "send");
            // `send` flushes, so a broken connection fails the send that hit it.
            match ws.send(Message::Text(json.into())).await {
                Ok(()) => Ok(()),
                Err(e) => self.lost(TransportError::SendFailed(e.to_string())),
            }
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<ServerFrame>>> {
        Box::pin(async move {
            loop {
                let Some(ws) = self.ws.as_mut() else {
                    return Err(TransportError::ConnectionClosed);
                };
                let message = match ws.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return self.lost(TransportError::ReceiveFailed(e.to_string())),
                    None => {
                        self.ws = None;
                        return Ok(None);
                    }
                };
                match decode(message)? {
                    Incoming::Frame(frame) => return Ok(Some(frame)),
                    Incoming::Closed => {
                        self.ws = None;
                        return Ok(None);
                    }
                    Incoming::Skip => {}
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.ws.is_some()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
