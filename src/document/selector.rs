//! CSS selectors, parsed and matched by the `selectors` engine behind
//! `scraper`.

use crate::document::errors::SelectorError;
use crate::document::{Document, NodeId};
use std::fmt;

/// A parsed selector list, e.g. `nav a.btn, [class~=card i]`.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    compiled: scraper::Selector,
}

impl Selector {
    /// Parse a selector list.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let source = input.trim();
        let compiled = scraper::Selector::parse(source).map_err(|err| SelectorError {
            selector: source.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    /// The selector text as given (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the element at `node` matches any alternative of this selector.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.scraper_element(node)
            .is_some_and(|element| self.compiled.matches(&element))
    }

    pub(crate) fn compiled(&self) -> &scraper::Selector {
        &self.compiled
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Selector {}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
