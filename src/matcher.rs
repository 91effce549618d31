//! Evaluate one pattern against a document.
//!
//! Candidates come from the pattern's selector and are narrowed by tag scope,
//! parent scope and conditions. Matching reads attribute values only; nothing
//! here mutates the document.

use crate::cache::MatchCache;
use crate::document::{Document, ElementRef, NodeId, Selector, SelectorError};
use crate::pattern::{
    Condition, ConditionKind, ConditionOperator, ConditionValue, Pattern, RegisteredPattern,
    TextMatcher,
};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// One substring of an attribute value that a pattern wants to replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub pattern_id: String,
    #[serde(skip)]
    pub element: NodeId,
    pub attribute: String,
    pub matched_text: String,
    /// Byte offset into the attribute value
    pub start: usize,
    pub end: usize,
    pub priority: i32,
    /// Registration order of the owning pattern
    #[serde(skip)]
    pub order: usize,
}

impl Match {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("invalid regex /{source_text}/: {cause}")]
    Regex {
        source_text: String,
        cause: regex::Error,
    },
}

/// Matches produced by one pattern, plus how many elements were examined.
#[derive(Debug, Default)]
pub struct PatternMatches {
    pub matches: Vec<Match>,
    pub examined: usize,
}

/// A pattern with its selectors and regexes compiled for one run.
pub struct CompiledPattern {
    pub pattern: Arc<Pattern>,
    pub order: usize,
    /// Registry generation of the snapshot the pattern came from
    generation: u64,
    selector: Selector,
    parent_include: Vec<Selector>,
    parent_exclude: Vec<Selector>,
    conditions: Vec<CompiledCondition>,
    regex: Option<Arc<Regex>>,
}

struct CompiledCondition {
    condition: Condition,
    target: Option<Selector>,
    regex: Option<Arc<Regex>>,
    /// Tag names compare ASCII case-insensitively
    fold_case: bool,
}

impl CompiledPattern {
    pub fn compile(
        entry: &RegisteredPattern,
        generation: u64,
        cache: &MatchCache,
    ) -> Result<Self, MatchError> {
        let pattern = Arc::clone(&entry.pattern);
        let selector = Selector::parse(&pattern.selector)?;
        let parent_include = compile_all(&pattern.parent_scope.include)?;
        let parent_exclude = compile_all(&pattern.parent_scope.exclude)?;

        let regex = match &pattern.matcher {
            TextMatcher::Regex(source) => Some(compile_regex(cache, source, !pattern.case_sensitive)?),
            TextMatcher::Literal(_) => None,
        };

        let conditions = pattern
            .conditions
            .iter()
            .map(|condition| CompiledCondition::compile(condition, cache))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pattern,
            order: entry.order,
            generation,
            selector,
            parent_include,
            parent_exclude,
            conditions,
            regex,
        })
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_deref()
    }

    /// Run the pattern over the whole document, elements in document order.
    pub fn find_matches(&self, doc: &Document, cache: &MatchCache) -> PatternMatches {
        let mut result = PatternMatches::default();
        for id in doc.query(&self.selector) {
            let Some(element) = doc.element_ref(id) else {
                continue;
            };
            result.examined += 1;
            if !self.applies_to(&element) {
                continue;
            }
            let found = self.find_in_element(&element, cache);
            let hit = !found.is_empty();
            result.matches.extend(found);
            if hit && self.pattern.run_once {
                break;
            }
        }
        result
    }

    /// Scope and condition checks; conditions short-circuit on the first failure.
    pub fn applies_to(&self, element: &ElementRef<'_>) -> bool {
        let scope = &self.pattern.tag_scope;
        let tag = element.tag();
        if !scope.include.is_empty() && !scope.include.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }
        if scope.exclude.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }

        if !self.parent_include.is_empty()
            && !element
                .ancestors()
                .any(|a| self.parent_include.iter().any(|s| a.matches(s)))
        {
            return false;
        }
        if element
            .ancestors()
            .any(|a| self.parent_exclude.iter().any(|s| a.matches(s)))
        {
            return false;
        }

        self.conditions.iter().all(|c| c.holds(element))
    }

    /// Matches in the pattern's attribute of one element, by ascending start.
    pub fn find_in_element(&self, element: &ElementRef<'_>, cache: &MatchCache) -> Vec<Match> {
        let pattern = &self.pattern;
        let Some(value) = element.attr(&pattern.attribute) else {
            return Vec::new();
        };
        if value.is_empty() {
            return Vec::new();
        }

        let spans = cache.spans(self.generation, &pattern.id, value, || self.search(value));
        spans
            .iter()
            .map(|&(start, end)| Match {
                pattern_id: pattern.id.clone(),
                element: element.id(),
                attribute: pattern.attribute.clone(),
                matched_text: value[start..end].to_string(),
                start,
                end,
                priority: pattern.priority,
                order: self.order,
            })
            .collect()
    }

    fn limit(&self) -> usize {
        let cap = self.pattern.max_matches.unwrap_or(usize::MAX);
        if self.pattern.multiple_matches {
            cap
        } else {
            cap.min(1)
        }
    }

    fn search(&self, value: &str) -> Vec<(usize, usize)> {
        let limit = self.limit();
        let whole_word = self.pattern.whole_word_only;
        let mut spans = Vec::new();

        match (&self.pattern.matcher, &self.regex) {
            (_, Some(re)) => {
                for m in re.find_iter(value) {
                    if spans.len() >= limit {
                        break;
                    }
                    if m.start() == m.end() {
                        continue;
                    }
                    if whole_word && !at_word_boundaries(value, m.start(), m.end()) {
                        continue;
                    }
                    spans.push((m.start(), m.end()));
                }
            }
            (TextMatcher::Literal(needle), None) => {
                let (haystack, needle) = if self.pattern.case_sensitive {
                    (value.to_string(), needle.clone())
                } else {
                    (value.to_ascii_lowercase(), needle.to_ascii_lowercase())
                };
                let mut from = 0;
                while spans.len() < limit {
                    let Some(found) = haystack[from..].find(&needle) else {
                        break;
                    };
                    let start = from + found;
                    let end = start + needle.len();
                    if !whole_word || at_word_boundaries(value, start, end) {
                        spans.push((start, end));
                    }
                    from = next_char_boundary(&haystack, start);
                    if from >= haystack.len() {
                        break;
                    }
                }
            }
            (TextMatcher::Regex(_), None) => {}
        }
        spans
    }
}

impl CompiledCondition {
    fn compile(condition: &Condition, cache: &MatchCache) -> Result<Self, MatchError> {
        let target = match &condition.kind {
            ConditionKind::Parent(selector) | ConditionKind::Sibling(selector) => {
                Some(Selector::parse(selector)?)
            }
            _ => None,
        };
        let fold_case = matches!(condition.kind, ConditionKind::Tag);
        let regex = match (&condition.operator, &condition.value) {
            (ConditionOperator::Exists, _) => None,
            (_, Some(ConditionValue::Regex(source)))
            | (ConditionOperator::Matches, Some(ConditionValue::Literal(source))) => {
                Some(compile_regex(cache, source, fold_case)?)
            }
            _ => None,
        };
        Ok(Self {
            condition: condition.clone(),
            target,
            regex,
            fold_case,
        })
    }

    fn holds(&self, element: &ElementRef<'_>) -> bool {
        let result = match &self.condition.kind {
            ConditionKind::Attribute(name) => self.test(element.attr(name)),
            ConditionKind::Text => self.test(Some(&element.text())),
            ConditionKind::Tag => self.test(Some(element.tag())),
            ConditionKind::Parent(_) => {
                let parent = element
                    .parent()
                    .filter(|p| self.target.as_ref().is_some_and(|s| p.matches(s)));
                match parent {
                    Some(p) => self.test(Some(&p.text())),
                    None => self.test(None),
                }
            }
            ConditionKind::Sibling(_) => match &self.target {
                Some(selector) => {
                    let siblings = element.siblings(selector);
                    if siblings.is_empty() {
                        self.test(None)
                    } else {
                        siblings.iter().any(|s| self.test(Some(&s.text())))
                    }
                }
                None => false,
            },
            ConditionKind::Custom(check) => check(element),
        };
        result != self.condition.negate
    }

    fn test(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        if let Some(re) = &self.regex {
            return re.is_match(actual);
        }
        let expected = match &self.condition.value {
            Some(ConditionValue::Literal(v)) | Some(ConditionValue::Regex(v)) => v.as_str(),
            None => "",
        };
        let (actual, expected) = if self.fold_case {
            (actual.to_ascii_lowercase(), expected.to_ascii_lowercase())
        } else {
            (actual.to_string(), expected.to_string())
        };
        let (actual, expected) = (actual.as_str(), expected.as_str());
        match self.condition.operator {
            ConditionOperator::Exists => true,
            ConditionOperator::Equals => actual == expected,
            ConditionOperator::Contains => actual.contains(expected),
            ConditionOperator::StartsWith => actual.starts_with(expected),
            ConditionOperator::EndsWith => actual.ends_with(expected),
            ConditionOperator::Matches => false,
        }
    }
}

fn compile_all(selectors: &[String]) -> Result<Vec<Selector>, SelectorError> {
    selectors.iter().map(|s| Selector::parse(s)).collect()
}

fn compile_regex(cache: &MatchCache, source: &str, case_insensitive: bool) -> Result<Arc<Regex>, MatchError> {
    cache
        .regex(source, case_insensitive)
        .map_err(|cause| MatchError::Regex {
            source_text: source.to_string(),
            cause,
        })
}

/// Class-name characters; `-` counts so `flex` never matches inside `flex-col`.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn at_word_boundaries(value: &str, start: usize, end: usize) -> bool {
    let before = value[..start].chars().next_back();
    let after = value[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn next_char_boundary(text: &str, from: usize) -> usize {
    let mut next = from + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternRegistry, Scope};

    fn compile(pattern: Pattern) -> (CompiledPattern, MatchCache) {
        let mut registry = PatternRegistry::new();
        registry.add(pattern).unwrap();
        let snapshot = registry.snapshot();
        let cache = MatchCache::new();
        let compiled = CompiledPattern::compile(&snapshot.patterns[0], snapshot.generation, &cache).unwrap();
        (compiled, cache)
    }

    fn spans(pattern: Pattern, html: &str) -> Vec<(usize, usize)> {
        let (compiled, cache) = compile(pattern);
        let doc = Document::parse(html);
        compiled
            .find_matches(&doc, &cache)
            .matches
            .iter()
            .map(|m| (m.start, m.end))
            .collect()
    }

    #[test]
    fn literal_whole_word() {
        let p = Pattern::literal("p", "div", "class", "flex", "f");
        assert_eq!(spans(p, r#"<div class="flex flex-col xflex flex">"#), vec![(0, 4), (20, 24)]);
    }

    #[test]
    fn literal_anywhere_rescans_from_next_index() {
        let p = Pattern::literal("p", "div", "class", "aa", "b").anywhere();
        assert_eq!(spans(p, r#"<div class="aaa">"#), vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn literal_case_insensitive() {
        let p = Pattern::literal("p", "div", "class", "Flex", "f").case_insensitive();
        assert_eq!(spans(p, r#"<div class="FLEX grid">"#), vec![(0, 4)]);
    }

    #[test]
    fn first_only_and_max_matches() {
        let p = Pattern::literal("p", "div", "class", "a", "b").first_only();
        assert_eq!(spans(p, r#"<div class="a a a">"#).len(), 1);

        let mut p = Pattern::literal("p", "div", "class", "a", "b");
        p.max_matches = Some(2);
        assert_eq!(spans(p, r#"<div class="a a a">"#), vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn regex_matches_case_insensitively() {
        let p = Pattern::regex("r", "div", "class", r"bg-\w+", "bg").case_insensitive();
        assert_eq!(spans(p, r#"<div class="BG-red p-2 bg-blue">"#), vec![(0, 6), (11, 18)]);
    }

    #[test]
    fn skips_missing_and_empty_attributes() {
        let p = Pattern::literal("p", "div", "class", "a", "b");
        assert!(spans(p, r#"<div></div><div class=""></div>"#).is_empty());
    }

    #[test]
    fn tag_and_parent_scope() {
        let mut p = Pattern::literal("p", "[class]", "class", "x", "y");
        p.tag_scope = Scope {
            include: vec!["span".into()],
            exclude: Vec::new(),
        };
        p.parent_scope = Scope {
            include: Vec::new(),
            exclude: vec![".skip".into()],
        };
        let html = r#"<div class="x"><span class="x"></span></div><div class="skip"><span class="x"></span></div>"#;
        let (compiled, cache) = compile(p);
        let doc = Document::parse(html);
        let found = compiled.find_matches(&doc, &cache);
        assert_eq!(found.matches.len(), 1);
        assert_eq!(doc.element(found.matches[0].element).unwrap().tag, "span");
        assert_eq!(found.examined, 4);
    }

    #[test]
    fn conditions_are_conjunctive() {
        let p = Pattern::literal("p", "div", "class", "x", "y")
            .with_condition(Condition::attribute_exists("data-opt"))
            .with_condition(Condition::new(
                ConditionKind::Text,
                ConditionOperator::Contains,
                Some(ConditionValue::Literal("go".into())),
            ));
        let html = r#"<div class="x" data-opt>go</div><div class="x" data-opt>stop</div><div class="x">go</div>"#;
        assert_eq!(spans(p, html).len(), 1);
    }

    #[test]
    fn negated_and_custom_conditions() {
        let p = Pattern::literal("p", "div", "class", "x", "y")
            .with_condition(Condition::attribute_exists("hidden").negated())
            .with_condition(Condition::new(
                ConditionKind::Custom(Arc::new(|el: &ElementRef<'_>| el.depth() == 1)),
                ConditionOperator::Exists,
                None,
            ));
        let html = r#"<div class="x"><div class="x"></div></div><div class="x" hidden></div>"#;
        assert_eq!(spans(p, html).len(), 1);
    }

    #[test]
    fn parent_and_sibling_conditions() {
        let p = Pattern::literal("p", "li", "class", "x", "y")
            .with_condition(Condition::new(
                ConditionKind::Parent("ul.menu".into()),
                ConditionOperator::Exists,
                None,
            ))
            .with_condition(Condition::new(
                ConditionKind::Sibling(".active".into()),
                ConditionOperator::Exists,
                None,
            ));
        let html = r#"<ul class="menu"><li class="x"></li><li class="active"></li></ul><ul><li class="x"></li><li class="active"></li></ul>"#;
        assert_eq!(spans(p, html).len(), 1);
    }

    #[test]
    fn tag_conditions_ignore_case() {
        let tag_is = |operator, value: &str| {
            Pattern::literal("p", "[class]", "class", "x", "y").with_condition(Condition::new(
                ConditionKind::Tag,
                operator,
                Some(ConditionValue::Literal(value.into())),
            ))
        };
        let html = r#"<div class="x"></div><SECTION class="x"></SECTION><span class="x"></span>"#;
        assert_eq!(spans(tag_is(ConditionOperator::Equals, "DIV"), html).len(), 1);
        assert_eq!(spans(tag_is(ConditionOperator::Equals, "section"), html).len(), 1);
        assert_eq!(spans(tag_is(ConditionOperator::StartsWith, "SP"), html).len(), 1);
        assert_eq!(spans(tag_is(ConditionOperator::Matches, "^(DIV|SPAN)$"), html).len(), 2);
    }

    #[test]
    fn run_once_stops_after_first_matching_element() {
        let mut p = Pattern::literal("p", "div", "class", "x", "y");
        p.run_once = true;
        let html = r#"<div class="a"></div><div class="x x"></div><div class="x"></div>"#;
        assert_eq!(spans(p, html), vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn non_ascii_values_do_not_split_characters() {
        let p = Pattern::literal("p", "div", "title", "é", "e").anywhere();
        assert_eq!(spans(p, r#"<div title="éé">"#), vec![(0, 2), (2, 4)]);
    }
}
