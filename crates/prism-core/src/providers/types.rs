//! Provider-agnostic types for streaming text generation

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Behavioural preamble sent to every provider alongside the prompt
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that responds in markdown";

/// Lazy stream of cumulative snapshots. Each item is the whole response so far.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Which provider a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    #[serde(rename = "GPT")]
    Gpt,
    #[serde(rename = "Claude")]
    Claude,
    #[serde(rename = "Gemini")]
    Gemini,
}

impl Selector {
    /// All selectors in the order the UI lists them
    pub const ALL: [Selector; 3] = [Selector::Gpt, Selector::Claude, Selector::Gemini];

    /// Label shown in the dropdown; also the only accepted spelling when parsing
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gpt => "GPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
        }
    }

    /// Vendor backing this selector
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Gpt => "openai",
            Self::Claude => "anthropic",
            Self::Gemini => "google",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sel| sel.label() == s)
            .ok_or_else(|| Error::UnrecognizedSelector(s.to_string()))
    }
}

/// Connection settings for one provider, built once at startup
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &if self.api_key.is_empty() { "(empty)" } else { "***" })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Anything that turns a prompt into a stream of cumulative snapshots
pub trait StreamingTextSource: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "anthropic")
    fn provider_name(&self) -> &str;

    /// Model identifier sent to the vendor
    fn model(&self) -> &str;

    /// Start a generation. No I/O happens until the returned stream is polled.
    fn stream(&self, prompt: &str) -> TextStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse_exact_labels() {
        assert_eq!("GPT".parse::<Selector>().unwrap(), Selector::Gpt);
        assert_eq!("Claude".parse::<Selector>().unwrap(), Selector::Claude);
        assert_eq!("Gemini".parse::<Selector>().unwrap(), Selector::Gemini);
    }

    #[test]
    fn test_selector_parse_is_case_sensitive() {
        for bad in ["gpt", "claude ", "", "Unknown"] {
            let err = bad.parse::<Selector>().unwrap_err();
            assert!(matches!(err, Error::UnrecognizedSelector(ref s) if s == bad));
        }
    }

    #[test]
    fn test_selector_display_matches_label() {
        for sel in Selector::ALL {
            assert_eq!(sel.to_string(), sel.label());
        }
    }

    #[test]
    fn test_selector_serde_uses_labels() {
        let json = serde_json::to_string(&Selector::Claude).unwrap();
        assert_eq!(json, "\"Claude\"");
        let sel: Selector = serde_json::from_str("\"Gemini\"").unwrap();
        assert_eq!(sel, Selector::Gemini);
    }

    #[test]
    fn test_settings_debug_hides_key() {
        let settings = ProviderSettings {
            api_key: "sk-secret".to_string(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4.1-mini".to_string(),
            max_tokens: None,
            temperature: None,
        };
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("gpt-4.1-mini"));
    }
}
