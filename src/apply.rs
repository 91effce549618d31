//! Turn winning matches into replacement text and rebuilt attribute values.

use crate::document::ElementRef;
use crate::edit::{apply_edits, Edit, EditError};
use crate::matcher::{CompiledPattern, Match};
use crate::pattern::{BoxError, ReplaceContext, Replacement};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Provenance of one applied replacement. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementRecord {
    pub pattern_id: String,
    pub element_selector: String,
    pub attribute: String,
    /// Text that was replaced
    pub original_value: String,
    /// Text that replaced it
    pub new_value: String,
    /// Byte offset of the replaced text in the attribute value
    pub offset: usize,
    pub tag: String,
    /// Element attributes before this element was rewritten
    pub attributes_snapshot: BTreeMap<String, String>,
    pub depth: usize,
    pub had_conflict: bool,
    pub applied_at: DateTime<Utc>,
}

impl ReplacementRecord {
    pub fn new(m: &Match, element: &ElementRef<'_>, new_value: String, had_conflict: bool) -> Self {
        Self {
            pattern_id: m.pattern_id.clone(),
            element_selector: element.selector_path(),
            attribute: m.attribute.clone(),
            original_value: m.matched_text.clone(),
            new_value,
            offset: m.start,
            tag: element.tag().to_string(),
            attributes_snapshot: element
                .attributes()
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            depth: element.depth(),
            had_conflict,
            applied_at: Utc::now(),
        }
    }
}

/// Compute the text that replaces `m`, after case mapping and escaping.
pub fn replacement_text(
    compiled: &CompiledPattern,
    m: &Match,
    element: &ElementRef<'_>,
    value: &str,
) -> Result<String, BoxError> {
    let pattern = &compiled.pattern;
    let raw = match &pattern.replacement {
        Replacement::Literal(template) => match compiled.regex() {
            Some(re) => expand_captures(re, value, m, template),
            None => template.clone(),
        },
        Replacement::Computed(compute) => {
            let ctx = ReplaceContext {
                pattern_id: &pattern.id,
                attribute: &pattern.attribute,
                value,
            };
            compute(m, element, &ctx)?
        }
    };

    let cased = if pattern.preserve_case {
        preserve_case(&m.matched_text, &raw)
    } else {
        raw
    };
    Ok(if pattern.escape_replacement {
        escape_html(&cased)
    } else {
        cased
    })
}

/// Expand `$1`/`${name}` references against the captures of the match at `m.start`.
fn expand_captures(re: &regex::Regex, value: &str, m: &Match, template: &str) -> String {
    if !template.contains('$') {
        return template.to_string();
    }
    match re.captures_at(value, m.start) {
        Some(caps) if caps.get(0).is_some_and(|whole| whole.start() == m.start && whole.end() == m.end) => {
            let mut out = String::new();
            caps.expand(template, &mut out);
            out
        }
        _ => template.to_string(),
    }
}

/// Map the case shape of `original` onto `replacement`.
pub fn preserve_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return replacement.to_string();
    }
    if letters.iter().all(|c| c.is_lowercase()) {
        return replacement.to_lowercase();
    }
    if letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if letters[0].is_uppercase() && letters[1..].iter().all(|c| c.is_lowercase()) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

/// Escape `& < > " '` for use inside markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Rebuild `value` with every `(match, replacement)` spliced in at once.
///
/// Spans refer to the original `value` and must be disjoint.
pub fn rebuild_value(value: &str, replacements: &[(&Match, &str)]) -> Result<String, EditError> {
    let edits = replacements
        .iter()
        .map(|(m, text)| Edit::new(m.start, m.end, *text, &m.matched_text))
        .collect();
    apply_edits(value, edits)
}
