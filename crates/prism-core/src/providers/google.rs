//! Google Gemini provider (`streamGenerateContent` over SSE)

use futures_util::{TryStreamExt, stream};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::accumulate::cumulative;
use crate::error::{Error, Result};
use crate::sse::SseEvent;

use super::types::{ProviderSettings, StreamingTextSource, TextStream};
use super::{Fragment, fragments, open_event_stream};

const PROVIDER: &str = "google";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini provider
pub struct GoogleProvider {
    client: Client,
    settings: ProviderSettings,
    system: String,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl GoogleProvider {
    pub fn new(client: Client, settings: &ProviderSettings, system: &str) -> Self {
        Self {
            client,
            settings: settings.clone(),
            system: system.to_string(),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]},
            ],
            "systemInstruction": {
                "parts": [{"text": self.system}]
            },
        });
        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = self.settings.max_tokens {
            generation.insert("maxOutputTokens".to_string(), max_tokens.into());
        }
        if let Some(temperature) = self.settings.temperature {
            generation.insert("temperature".to_string(), temperature.into());
        }
        if !generation.is_empty() {
            body["generationConfig"] = generation.into();
        }
        body
    }

    fn request(&self, prompt: &str) -> RequestBuilder {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        );
        self.client
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&self.request_body(prompt))
    }

    /// Each chunk is a partial `GenerateContentResponse` holding only new text
    fn parse_event(event: &SseEvent) -> Result<Fragment> {
        let chunk: GeminiChunk = serde_json::from_str(&event.data).map_err(|source| {
            Error::MalformedEvent {
                provider: PROVIDER,
                source,
            }
        })?;
        if let Some(error) = chunk.error {
            return Err(Error::Api {
                provider: PROVIDER,
                status: error.code,
                message: error.message,
            });
        }
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Error::Api {
                provider: PROVIDER,
                status: None,
                message: format!("prompt blocked: {}", reason),
            });
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(Fragment::Skip);
        };
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if !text.is_empty() {
            return Ok(Fragment::Text(text));
        }
        match candidate.finish_reason.as_deref() {
            Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => Err(Error::Api {
                provider: PROVIDER,
                status: None,
                message: format!("response blocked: {}", reason),
            }),
            _ => Ok(Fragment::Skip),
        }
    }
}

impl StreamingTextSource for GoogleProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn stream(&self, prompt: &str) -> TextStream {
        debug!(
            "Gemini request: model={}, prompt_chars={}",
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

/// Finish reasons that end a candidate without any text
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

// ── Gemini wire types ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}
