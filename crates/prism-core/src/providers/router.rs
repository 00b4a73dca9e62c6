//! Model router: selector label in, provider stream out

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

use super::types::{Selector, StreamingTextSource, TextStream};

/// Dispatches a prompt to the source registered for a selector
pub struct ModelRouter {
    sources: HashMap<Selector, Arc<dyn StreamingTextSource>>,
}

/// Collects the selector → source mapping at configuration time
#[derive(Default)]
pub struct ModelRouterBuilder {
    sources: HashMap<Selector, Arc<dyn StreamingTextSource>>,
}

impl ModelRouterBuilder {
    /// Register (or replace) the source behind a selector
    pub fn source(mut self, selector: Selector, source: Arc<dyn StreamingTextSource>) -> Self {
        self.sources.insert(selector, source);
        self
    }

    pub fn build(self) -> ModelRouter {
        ModelRouter {
            sources: self.sources,
        }
    }
}

impl ModelRouter {
    pub fn builder() -> ModelRouterBuilder {
        ModelRouterBuilder::default()
    }

    /// Route by label. Unknown labels fail before any source is touched.
    pub fn route(&self, prompt: &str, selector: &str) -> Result<TextStream> {
        let selector: Selector = selector.parse()?;
        self.route_selector(prompt, selector)
    }

    /// Route by typed selector; the source's stream is returned as-is
    pub fn route_selector(&self, prompt: &str, selector: Selector) -> Result<TextStream> {
        let source = self
            .sources
            .get(&selector)
            .ok_or_else(|| Error::UnrecognizedSelector(selector.to_string()))?;

        debug!(
            "Routing {} to {} ({})",
            selector,
            source.provider_name(),
            source.model()
        );
        Ok(source.stream(prompt))
    }

    /// Configured selectors, in UI order
    pub fn selectors(&self) -> Vec<Selector> {
        Selector::ALL
            .into_iter()
            .filter(|s| self.sources.contains_key(s))
            .collect()
    }

    pub fn source(&self, selector: Selector) -> Option<&Arc<dyn StreamingTextSource>> {
        self.sources.get(&selector)
    }

    /// Number of configured sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
