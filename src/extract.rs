//! Ordered fallback extraction of article text from parsed HTML.
//!
//! An [`ExtractionChain`] is a list of named strategies, each a pure function
//! over the parsed document. Strategies run in order and the first one that
//! produces non-empty text wins. The default chain is built from CSS
//! selectors (`article`, then site-specific body containers).

use crate::error::{Error, Result};
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use std::fmt;

/// A single extraction strategy. Returns an empty string when it finds nothing.
pub type Extractor = Box<dyn Fn(&Html) -> String + Send + Sync>;

/// Elements whose text never belongs in article content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub struct ExtractionChain {
    strategies: Vec<(String, Extractor)>,
}

impl ExtractionChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// One selector-text strategy per entry, in the given order.
    pub fn from_selectors(selectors: &[String]) -> Result<Self> {
        let mut chain = Self::new();
        for raw in selectors {
            let selector = Selector::parse(raw)
                .map_err(|e| Error::Config(format!("invalid selector {raw:?}: {e}")))?;
            chain = chain.with_strategy(raw.clone(), selector_text(selector));
        }
        Ok(chain)
    }

    pub fn with_strategy(mut self, name: impl Into<String>, extractor: Extractor) -> Self {
        self.strategies.push((name.into(), extractor));
        self
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Run strategies in order; returns the winning strategy's name and text.
    pub fn extract<'a>(&'a self, document: &Html) -> Option<(&'a str, String)> {
        self.strategies.iter().find_map(|(name, extractor)| {
            let text = extractor(document);
            (!text.is_empty()).then(|| (name.as_str(), text))
        })
    }
}

impl Default for ExtractionChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtractionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Strategy returning the visible text of every element matching `selector`.
pub fn selector_text(selector: Selector) -> Extractor {
    Box::new(move |document: &Html| {
        document
            .select(&selector)
            .map(|element| visible_text(element))
            .filter(|text| !text.is_empty())
            .join(" ")
    })
}

/// Text under `element` with whitespace collapsed, skipping script-like nodes.
pub fn visible_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
            });
            (!hidden).then_some(&**text)
        })
        .flat_map(str::split_whitespace)
        .join(" ")
}
