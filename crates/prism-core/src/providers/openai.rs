//! OpenAI chat-completions provider (GPT-4.1 family)

use futures_util::{TryStreamExt, stream};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::accumulate::cumulative;
use crate::error::{Error, Result};
use crate::sse::SseEvent;

use super::types::{ProviderSettings, StreamingTextSource, TextStream};
use super::{Fragment, fragments, open_event_stream};

const PROVIDER: &str = "openai";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    settings: ProviderSettings,
    system: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(client: Client, settings: &ProviderSettings, system: &str) -> Self {
        Self {
            client,
            settings: settings.clone(),
            system: system.to_string(),
        }
    }

    /// Chat-completions body: system + user message with `stream: true`
    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": self.system},
                {"role": "user", "content": prompt},
            ],
            "stream": true,
        });
        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = self.settings.temperature {
            body["temperature"] = temperature.into();
        }
        body
    }

    fn request(&self, prompt: &str) -> RequestBuilder {
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        self.client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(&self.request_body(prompt))
    }

    /// Each chunk carries a delta; `content` is null on the role header and the final chunk
    fn parse_event(event: &SseEvent) -> Result<Fragment> {
        if event.data.trim() == "[DONE]" {
            return Ok(Fragment::Done);
        }
        let chunk: OpenAiChunk = serde_json::from_str(&event.data).map_err(|source| {
            Error::MalformedEvent {
                provider: PROVIDER,
                source,
            }
        })?;
        if let Some(error) = chunk.error {
            return Err(Error::Api {
                provider: PROVIDER,
                status: None,
                message: error.message,
            });
        }
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .map_or(Fragment::Skip, Fragment::Text))
    }
}

impl StreamingTextSource for OpenAiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn stream(&self, prompt: &str) -> TextStream {
        debug!(
            "OpenAI request: model={}, prompt_chars={}",
            self.settings.model,
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

// ── OpenAI wire types ──

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
