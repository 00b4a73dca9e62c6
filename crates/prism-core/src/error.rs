//! Error taxonomy shared by adapters, the router and response panels

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Selector label matched none of the configured providers
    #[error("unrecognized model selector '{0}'")]
    UnrecognizedSelector(String),

    /// Vendor rejected the credentials (missing, invalid or revoked key)
    #[error("{provider} rejected the API key (status {status}): {message}")]
    Authentication {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Any other non-success answer, including error events sent mid-stream
    #[error("{provider} API request failed{}: {message}", status_suffix(.status))]
    Api {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} transport error: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed {provider} stream event: {source}")]
    MalformedEvent {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The consumer of a stream went away (closed socket, broken pipe)
    #[error("response panel closed: {0}")]
    Panel(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl Error {
    /// Short machine-readable label, sent to the UI alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnrecognizedSelector(_) => "unrecognized_selector",
            Self::Authentication { .. } => "authentication",
            Self::Api { .. } => "api",
            Self::Transport { .. } => "transport",
            Self::MalformedEvent { .. } => "malformed_event",
            Self::HttpClient(_) => "http_client",
            Self::Panel(_) => "panel",
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            Error::UnrecognizedSelector("Llama".to_string()).kind(),
            "unrecognized_selector"
        );
        assert_eq!(Error::Panel("gone".to_string()).kind(), "panel");
    }

    #[test]
    fn test_api_display_with_and_without_status() {
        let with_status = Error::Api {
            provider: "openai",
            status: Some(429),
            message: "quota exceeded".to_string(),
        };
        assert_eq!(
            with_status.to_string(),
            "openai API request failed with status 429: quota exceeded"
        );

        let mid_stream = Error::Api {
            provider: "anthropic",
            status: None,
            message: "Overloaded".to_string(),
        };
        assert_eq!(
            mid_stream.to_string(),
            "anthropic API request failed: Overloaded"
        );
    }

    #[test]
    fn test_is_authentication() {
        let err = Error::Authentication {
            provider: "google",
            status: 401,
            message: "API key not valid".to_string(),
        };
        assert!(err.is_authentication());
        assert!(!Error::UnrecognizedSelector("x".to_string()).is_authentication());
    }
}
