//! Connection session: at most one streaming request in flight per socket
//!
//! A new submit abandons the prior request: its task is cancelled and its
//! vendor stream dropped, which closes the upstream connection.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use prism_core::{Selector, TextStream};

use crate::events::{EventSink, SocketPanel};
use crate::protocol::ResponseEvent;

struct InFlight {
    request_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Outcome of [`Session::start`]
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub request_id: String,
    /// Request that was still streaming and got cancelled
    pub abandoned: Option<String>,
}

/// State of one WebSocket connection
pub struct Session {
    sink: EventSink,
    in_flight: Option<InFlight>,
    opened_at: DateTime<Utc>,
    submitted: u64,
}

impl Session {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            in_flight: None,
            opened_at: Utc::now(),
            submitted: 0,
        }
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Number of prompts submitted on this connection
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// ID of the request still streaming, if any
    pub fn active_request(&self) -> Option<&str> {
        self.in_flight
            .as_ref()
            .filter(|f| !f.handle.is_finished())
            .map(|f| f.request_id.as_str())
    }

    /// Abandon whatever was running, announce the new request and spawn its binding.
    ///
    /// `response.started` is queued here rather than in the spawned task, so
    /// the page sees started events in submit order.
    pub async fn start(&mut self, stream: TextStream, selector: Selector) -> Submitted {
        let abandoned = self.cancel();
        if let Some(prior) = &abandoned {
            debug!("Abandoning request {} for a new submit", prior);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        self.sink
            .emit(ResponseEvent::Started {
                request_id: request_id.clone(),
                model: selector,
            })
            .await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_request(
            stream,
            self.sink.clone(),
            request_id.clone(),
            selector,
            cancel.clone(),
        ));

        self.submitted += 1;
        self.in_flight = Some(InFlight {
            request_id: request_id.clone(),
            cancel,
            handle,
        });
        Submitted {
            request_id,
            abandoned,
        }
    }

    /// Cancel the in-flight request. Returns its ID if it was still running.
    pub fn cancel(&mut self) -> Option<String> {
        let prior = self.in_flight.take()?;
        if prior.handle.is_finished() {
            return None;
        }
        prior.cancel.cancel();
        Some(prior.request_id)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(prior) = self.in_flight.take() {
            prior.cancel.cancel();
        }
    }
}

/// Bind one stream to a socket panel, reporting completion, failure or cancellation
async fn run_request(
    stream: TextStream,
    sink: EventSink,
    request_id: String,
    selector: Selector,
    cancel: CancellationToken,
) {
    let mut panel = SocketPanel::new(sink.clone(), request_id.clone());
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Request {} cancelled", request_id);
            ResponseEvent::Cancelled { request_id }
        }
        result = prism_core::bind(stream, &mut panel) => match result {
            Ok(summary) => {
                debug!("Request {} finished ({} snapshots)", request_id, summary.snapshots);
                ResponseEvent::Done {
                    request_id,
                    snapshots: summary.snapshots,
                }
            }
            Err(e) => {
                warn!("Request {} to {} failed: {}", request_id, selector, e);
                ResponseEvent::Failed {
                    request_id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    };
    sink.emit(outcome).await;
}
