//! Anthropic Claude provider (Messages API, streaming)
//!
//! The open response body lives inside the returned stream. Dropping the
//! stream early, or finishing it, releases the connection.

use futures_util::{TryStreamExt, stream};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::accumulate::cumulative;
use crate::error::{Error, Result};
use crate::sse::SseEvent;

use super::types::{ProviderSettings, StreamingTextSource, TextStream};
use super::{Fragment, fragments, open_event_stream};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    settings: ProviderSettings,
    system: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("max_tokens", &self.max_tokens())
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(client: Client, settings: &ProviderSettings, system: &str) -> Self {
        Self {
            client,
            settings: settings.clone(),
            system: system.to_string(),
        }
    }

    /// The Messages API refuses requests without a token cap
    fn max_tokens(&self) -> u32 {
        self.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.max_tokens(),
            "system": self.system,
            "messages": [
                {"role": "user", "content": prompt},
            ],
            "stream": true,
        });
        if let Some(temperature) = self.settings.temperature {
            body["temperature"] = temperature.into();
        }
        body
    }

    fn request(&self, prompt: &str) -> RequestBuilder {
        let url = format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'));
        self.client
            .post(url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(prompt))
    }

    fn parse_event(event: &SseEvent) -> Result<Fragment> {
        let parsed: AnthropicEvent = serde_json::from_str(&event.data).map_err(|source| {
            Error::MalformedEvent {
                provider: PROVIDER,
                source,
            }
        })?;
        match parsed {
            AnthropicEvent::ContentBlockDelta {
                delta: AnthropicDelta::TextDelta { text },
            } => Ok(Fragment::Text(text)),
            AnthropicEvent::MessageStop => Ok(Fragment::Done),
            AnthropicEvent::Error { error } => Err(Error::Api {
                provider: PROVIDER,
                status: None,
                message: format!("{}: {}", error.r#type, error.message),
            }),
            _ => Ok(Fragment::Skip),
        }
    }
}

impl StreamingTextSource for AnthropicProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn stream(&self, prompt: &str) -> TextStream {
        debug!(
            "Anthropic request: model={}, max_tokens={}, prompt_chars={}",
            self.settings.model,
            self.max_tokens(),
            prompt.len()
        );
        let request = self.request(prompt);
        let open = async move {
            let events = open_event_stream(PROVIDER, request).await?;
            Ok::<_, Error>(fragments(events, Self::parse_event))
        };
        cumulative(stream::once(open).try_flatten())
    }
}

// ── Anthropic wire types ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    MessageStop,
    Error {
        error: AnthropicErrorBody,
    },
    /// message_start, content_block_start/stop, message_delta, ping
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    r#type: String,
    message: String,
}
