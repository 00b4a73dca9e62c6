//! Streaming provider adapters
//!
//! Supports OpenAI, Anthropic and Google Gemini. Each adapter implements
//! [`StreamingTextSource`] and is registered with the [`ModelRouter`] under a
//! [`Selector`].

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod router;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use router::{ModelRouter, ModelRouterBuilder};
pub use types::{ProviderSettings, Selector, StreamingTextSource, SYSTEM_INSTRUCTION, TextStream};

use futures_util::{Stream, StreamExt, TryStreamExt, future};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::warn;

use crate::error::{Error, Result};
use crate::sse::{self, SseEvent};

/// Build the HTTP client shared by all adapters.
///
/// No overall timeout is set: a streamed answer may legitimately take minutes.
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("prism/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::HttpClient)
}

/// What a single vendor event contributes to the answer
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Fragment {
    Text(String),
    /// Keep-alives, role headers, usage reports
    Skip,
    /// Vendor signalled the end of the answer
    Done,
}

/// Send the request and hand back the decoded event stream.
///
/// 401/403 map to [`Error::Authentication`], any other failure status to [`Error::Api`].
pub(crate) async fn open_event_stream(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<impl Stream<Item = Result<SseEvent>> + Send> {
    let response = request
        .send()
        .await
        .map_err(|source| Error::Transport { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!("{} streaming request failed with status {}", provider, status);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication {
                provider,
                status: status.as_u16(),
                message,
            },
            _ => Error::Api {
                provider,
                status: Some(status.as_u16()),
                message,
            },
        });
    }

    let body = response
        .bytes_stream()
        .map_err(move |source| Error::Transport { provider, source })
        .boxed();
    Ok(sse::decode_events(body))
}

/// Map events to text fragments until the vendor's end marker or the first error
pub(crate) fn fragments<S, F>(events: S, mut parse: F) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<SseEvent>> + Send,
    F: FnMut(&SseEvent) -> Result<Fragment> + Send,
{
    events
        .scan(false, move |done, event| {
            if *done {
                return future::ready(None);
            }
            let item = match event.and_then(|e| parse(&e)) {
                Ok(Fragment::Text(text)) => Some(Ok(text)),
                Ok(Fragment::Skip) => None,
                Ok(Fragment::Done) => {
                    *done = true;
                    return future::ready(None);
                }
                Err(e) => {
                    *done = true;
                    Some(Err(e))
                }
            };
            future::ready(Some(item))
        })
        .filter_map(future::ready)
}
