//! Verified byte-span replacement.
//!
//! Every mutation this crate performs on text (a class attribute value, or the
//! serialized document around it) compiles down to [`Edit`]. Edits are
//! computed against one snapshot of the text and applied together in a single
//! rebuild, so earlier replacements never shift the offsets of later ones.

use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A byte-span replacement with verification of the text it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until passed to apply_edits()"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to place at [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at [{byte_start}, {byte_end}): found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {text_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        text_len: usize,
    },

    #[error("byte offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },

    #[error("edits overlap: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
}

impl Edit {
    /// Create a replacement edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Create a zero-width insertion at `at`.
    pub fn insertion(at: usize, new_text: impl Into<String>) -> Self {
        Self::new(at, at, new_text, "")
    }

    /// Validate the edit against `text`, returning the current text at the span.
    fn validate<'a>(&self, text: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > text.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                text_len: text.len(),
            });
        }
        for offset in [self.byte_start, self.byte_end] {
            if !text.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &text[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }
        Ok(current)
    }

    /// Number of bytes this edit adds (positive) or removes (negative).
    pub fn delta(&self) -> isize {
        self.new_text.len() as isize - (self.byte_end - self.byte_start) as isize
    }
}

/// Apply a set of edits computed against `text` in one pass.
///
/// All edits are validated against the original text before anything is
/// built. Spans must be disjoint; zero-width insertions may touch a
/// neighbouring span.
pub fn apply_edits(text: &str, mut edits: Vec<Edit>) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(text.to_string());
    }

    edits.sort_by(|a, b| {
        a.byte_start
            .cmp(&b.byte_start)
            .then(a.byte_end.cmp(&b.byte_end))
    });

    for edit in &edits {
        edit.validate(text)?;
    }

    for pair in edits.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if first.byte_end > second.byte_start {
            return Err(EditError::Overlap {
                first_start: first.byte_start,
                first_end: first.byte_end,
                second_start: second.byte_start,
                second_end: second.byte_end,
            });
        }
    }

    let growth: isize = edits.iter().map(Edit::delta).sum();
    let mut out = String::with_capacity((text.len() as isize + growth.max(0)) as usize);
    let mut cursor = 0;
    for edit in &edits {
        out.push_str(&text[cursor..edit.byte_start]);
        out.push_str(&edit.new_text);
        cursor = edit.byte_end;
    }
    out.push_str(&text[cursor..]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn test_apply_single_edit() {
        let out = apply_edits("flex items-center", vec![Edit::new(0, 4, "f", "flex")]).unwrap();
        assert_eq!(out, "f items-center");
    }

    #[test]
    fn test_apply_multiple_edits_uses_original_offsets() {
        let text = "aa bbbb c";
        let edits = vec![
            Edit::new(8, 9, "CCCC", "c"),
            Edit::new(0, 2, "A", "aa"),
            Edit::new(3, 7, "B", "bbbb"),
        ];
        assert_eq!(apply_edits(text, edits).unwrap(), "A B CCCC");
    }

    #[test]
    fn test_insertion_next_to_replacement() {
        let text = "<div class=\"a\">";
        let edits = vec![Edit::new(12, 13, "b", "a"), Edit::insertion(14, " id=\"x\"")];
        assert_eq!(apply_edits(text, edits).unwrap(), "<div class=\"b\" id=\"x\">");
    }

    #[test]
    fn test_before_text_mismatch() {
        let result = apply_edits("hello", vec![Edit::new(0, 5, "x", "world")]);
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_invalid_range() {
        let result = apply_edits("hello", vec![Edit::new(3, 20, "x", "")]);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
        let result = apply_edits("hello", vec![Edit::new(4, 2, "x", "")]);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_overlap_rejected() {
        let edits = vec![Edit::new(0, 4, "x", "abcd"), Edit::new(2, 6, "y", "cdef")];
        let result = apply_edits("abcdef", edits);
        assert!(matches!(result, Err(EditError::Overlap { .. })));
    }

    #[test]
    fn test_char_boundary_enforced() {
        let result = apply_edits("héllo", vec![Edit::new(0, 2, "x", "h\u{00c3}")]);
        assert!(matches!(result, Err(EditError::NotCharBoundary { offset: 2 })));
    }
}
