//! Per-connection event sink and the socket-backed response panel

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::error;

use prism_core::ResponsePanel;

use crate::protocol::{Reply, ResponseEvent};

/// Queue of serialized frames drained by the connection's writer task
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<String>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    /// Push an event; `false` once the connection is gone
    pub async fn emit(&self, event: ResponseEvent) -> bool {
        self.send_json(&event).await
    }

    /// Answer a method call; `false` once the connection is gone
    pub async fn respond(&self, reply: &Reply) -> bool {
        self.send_json(reply).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.sender.send(json).await.is_ok(),
            Err(e) => {
                error!("Failed to serialize frame: {}", e);
                false
            }
        }
    }
}

/// Output region of one request: each replace becomes a `response.snapshot` event
pub struct SocketPanel {
    sink: EventSink,
    request_id: String,
}

impl SocketPanel {
    pub fn new(sink: EventSink, request_id: impl Into<String>) -> Self {
        Self {
            sink,
            request_id: request_id.into(),
        }
    }
}

#[async_trait]
impl ResponsePanel for SocketPanel {
    async fn replace(&mut self, markdown: &str) -> prism_core::Result<()> {
        let event = ResponseEvent::Snapshot {
            request_id: self.request_id.clone(),
            content: markdown.to_string(),
        };
        if self.sink.emit(event).await {
            Ok(())
        } else {
            Err(prism_core::Error::Panel("websocket closed".to_string()))
        }
    }
}
