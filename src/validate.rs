//! Structural validation of rewritten output.
//!
//! After a document is rewritten it is parsed again. If the rewritten output
//! carries a parse diagnostic kind more often than the original did, the
//! rewrite broke the markup and must not be written.

use crate::document::{DiagnosticKind, Document, ParseDiagnostic};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("rewritten output of {file} is malformed: {}", summarize(.introduced))]
pub struct HtmlValidationError {
    /// File path, or `<memory>`
    pub file: String,
    /// Diagnostics present in the output but not in the original
    pub introduced: Vec<ParseDiagnostic>,
}

/// Check that `content` parses without any diagnostics.
pub fn validate(file: &str, content: &str) -> Result<(), HtmlValidationError> {
    let doc = Document::parse(content);
    if doc.diagnostics().is_empty() {
        Ok(())
    } else {
        Err(HtmlValidationError {
            file: file.to_string(),
            introduced: doc.diagnostics().to_vec(),
        })
    }
}

/// Compare `original` and `edited`; errors existing in the original are tolerated.
pub fn validate_edit(file: &str, original: &str, edited: &str) -> Result<(), HtmlValidationError> {
    let before = count_by_kind(Document::parse(original).diagnostics());
    let after_doc = Document::parse(edited);

    let mut seen: BTreeMap<DiagnosticKind, usize> = BTreeMap::new();
    let mut introduced = Vec::new();
    for diagnostic in after_doc.diagnostics() {
        let count = seen.entry(diagnostic.kind).or_default();
        *count += 1;
        if *count > before.get(&diagnostic.kind).copied().unwrap_or_default() {
            introduced.push(diagnostic.clone());
        }
    }

    if introduced.is_empty() {
        Ok(())
    } else {
        Err(HtmlValidationError {
            file: file.to_string(),
            introduced,
        })
    }
}

fn count_by_kind(diagnostics: &[ParseDiagnostic]) -> BTreeMap<DiagnosticKind, usize> {
    let mut counts = BTreeMap::new();
    for diagnostic in diagnostics {
        *counts.entry(diagnostic.kind).or_default() += 1;
    }
    counts
}

fn summarize(introduced: &[ParseDiagnostic]) -> String {
    match introduced {
        [] => "no new diagnostics".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_markup_passes() {
        assert!(validate("<memory>", r#"<div class="a"><p>x</p></div>"#).is_ok());
    }

    #[test]
    fn unclosed_element_fails() {
        let err = validate("<memory>", "<div><section>text").unwrap_err();
        assert!(!err.introduced.is_empty());
    }

    #[test]
    fn edit_introducing_error_is_rejected() {
        let original = r#"<div class="a"></div>"#;
        let edited = r#"<div class="a></div>"#;
        let err = validate_edit("page.html", original, edited).unwrap_err();
        assert_eq!(err.file, "page.html");
        assert!(err.to_string().contains("page.html"));
    }

    #[test]
    fn edit_preserving_existing_error_is_accepted() {
        let original = "<div><section class=\"a\">";
        let edited = "<div><section class=\"b\">";
        assert!(validate_edit("<memory>", original, edited).is_ok());
    }
}
