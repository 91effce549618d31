use crate::document::ElementRef;
use crate::matcher::Match;
use std::fmt;
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Context handed to computed replacements.
#[derive(Debug, Clone, Copy)]
pub struct ReplaceContext<'a> {
    pub pattern_id: &'a str,
    pub attribute: &'a str,
    /// Attribute value the match offsets refer to
    pub value: &'a str,
}

pub type ComputeFn =
    dyn Fn(&Match, &ElementRef<'_>, &ReplaceContext<'_>) -> Result<String, BoxError> + Send + Sync;

pub type CustomConditionFn = dyn Fn(&ElementRef<'_>) -> bool + Send + Sync;

/// A rewrite rule: what to find in which attribute of which elements, and what
/// to put in its place.
#[derive(Clone)]
pub struct Pattern {
    pub id: String,
    pub selector: String,
    pub attribute: String,
    pub matcher: TextMatcher,
    pub replacement: Replacement,
    /// All conditions must hold
    pub conditions: Vec<Condition>,
    pub case_sensitive: bool,
    pub whole_word_only: bool,
    pub multiple_matches: bool,
    /// Per-element cap on matches
    pub max_matches: Option<usize>,
    pub preserve_case: bool,
    pub escape_replacement: bool,
    /// Contribute matches from the first matching element only
    pub run_once: bool,
    pub priority: i32,
    pub enabled: bool,
    /// Tag names
    pub tag_scope: Scope,
    /// Ancestor selectors
    pub parent_scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatcher {
    Literal(String),
    Regex(String),
}

#[derive(Clone)]
pub enum Replacement {
    Literal(String),
    Computed(Arc<ComputeFn>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Condition {
    pub kind: ConditionKind,
    pub operator: ConditionOperator,
    pub value: Option<ConditionValue>,
    pub negate: bool,
}

#[derive(Clone)]
pub enum ConditionKind {
    /// Value of the named attribute
    Attribute(String),
    /// Text content of the element
    Text,
    /// Tag name
    Tag,
    /// Parent element matching the selector
    Parent(String),
    /// Sibling elements matching the selector
    Sibling(String),
    Custom(Arc<CustomConditionFn>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    Literal(String),
    Regex(String),
}

/// A named group of patterns registered as a unit.
#[derive(Clone, Debug)]
pub struct PatternSet {
    pub name: String,
    pub patterns: Vec<Pattern>,
    pub enabled: bool,
    /// Added to every member's priority on registration
    pub priority: i32,
}

impl Pattern {
    /// A literal pattern with the defaults used for class rewriting:
    /// case-sensitive, whole-word, every occurrence.
    pub fn literal(
        id: impl Into<String>,
        selector: impl Into<String>,
        attribute: impl Into<String>,
        find: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            selector: selector.into(),
            attribute: attribute.into(),
            matcher: TextMatcher::Literal(find.into()),
            replacement: Replacement::Literal(replace.into()),
            conditions: Vec::new(),
            case_sensitive: true,
            whole_word_only: true,
            multiple_matches: true,
            max_matches: None,
            preserve_case: false,
            escape_replacement: false,
            run_once: false,
            priority: 0,
            enabled: true,
            tag_scope: Scope::default(),
            parent_scope: Scope::default(),
        }
    }

    /// A regex pattern; same defaults as [`Pattern::literal`] except word boundaries.
    pub fn regex(
        id: impl Into<String>,
        selector: impl Into<String>,
        attribute: impl Into<String>,
        regex: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        let mut pattern = Self::literal(id, selector, attribute, "", replace);
        pattern.matcher = TextMatcher::Regex(regex.into());
        pattern.whole_word_only = false;
        pattern
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_computed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Match, &ElementRef<'_>, &ReplaceContext<'_>) -> Result<String, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.replacement = Replacement::Computed(Arc::new(f));
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn anywhere(mut self) -> Self {
        self.whole_word_only = false;
        self
    }

    pub fn first_only(mut self) -> Self {
        self.multiple_matches = false;
        self
    }
}

impl Condition {
    pub fn new(kind: ConditionKind, operator: ConditionOperator, value: Option<ConditionValue>) -> Self {
        Self {
            kind,
            operator,
            value,
            negate: false,
        }
    }

    pub fn attribute_exists(name: impl Into<String>) -> Self {
        Self::new(ConditionKind::Attribute(name.into()), ConditionOperator::Exists, None)
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("id", &self.id)
            .field("selector", &self.selector)
            .field("attribute", &self.attribute)
            .field("matcher", &self.matcher)
            .field("replacement", &self.replacement)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Replacement::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            ConditionKind::Text => f.write_str("Text"),
            ConditionKind::Tag => f.write_str("Tag"),
            ConditionKind::Parent(selector) => f.debug_tuple("Parent").field(selector).finish(),
            ConditionKind::Sibling(selector) => f.debug_tuple("Sibling").field(selector).finish(),
            ConditionKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatcher::Literal(text) => write!(f, "{text:?}"),
            TextMatcher::Regex(re) => write!(f, "/{re}/"),
        }
    }
}
