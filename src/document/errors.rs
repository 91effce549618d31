use crate::edit::EditError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid selector '{selector}': {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("node {0} is not an element")]
    NotAnElement(usize),

    #[error("node {0} does not exist")]
    UnknownNode(usize),

    #[error("invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("selector error: {0}")]
    Selector(#[from] SelectorError),

    #[error("serialization failed: {0}")]
    Serialize(#[from] EditError),
}

/// A structural problem noticed while tokenizing markup.
///
/// Parsing is lenient and always produces a tree; diagnostics record the
/// places where the markup had to be guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostic {
    pub kind: DiagnosticKind,
    /// Byte offset in the source where the problem starts
    pub offset: usize,
    /// Tag or construct involved, when known
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    UnterminatedComment,
    UnterminatedTag,
    UnterminatedQuote,
    StrayEndTag,
    UnclosedElement,
    /// A start tag the tree builder dropped, e.g. `<tr>` outside a table
    DiscardedElement,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DiagnosticKind::UnterminatedComment => "unterminated comment",
            DiagnosticKind::UnterminatedTag => "unterminated tag",
            DiagnosticKind::UnterminatedQuote => "unterminated attribute quote",
            DiagnosticKind::StrayEndTag => "end tag without matching start tag",
            DiagnosticKind::UnclosedElement => "element never closed",
            DiagnosticKind::DiscardedElement => "start tag dropped by the tree builder",
        };
        match &self.subject {
            Some(subject) => write!(f, "{what} <{subject}> at byte {}", self.offset),
            None => write!(f, "{what} at byte {}", self.offset),
        }
    }
}
