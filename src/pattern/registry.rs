use crate::document::Selector;
use crate::pattern::errors::{PatternSetValidationError, PatternValidationError, ValidationIssue};
use crate::pattern::schema::{
    Condition, ConditionKind, ConditionOperator, ConditionValue, Pattern, PatternSet, Replacement,
    TextMatcher,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A registered pattern and its registration sequence number.
#[derive(Debug, Clone)]
pub struct RegisteredPattern {
    pub pattern: Arc<Pattern>,
    /// Monotonic registration order; breaks priority ties
    pub order: usize,
}

/// Stores validated patterns for the lifetime of an engine.
///
/// Every successful mutation bumps [`PatternRegistry::generation`], which
/// callers use to invalidate anything derived from the registered patterns.
#[derive(Debug, Default)]
pub struct PatternRegistry {
    patterns: Vec<RegisteredPattern>,
    next_order: usize,
    generation: u64,
}

/// Immutable view of the enabled patterns, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct PatternSnapshot {
    pub generation: u64,
    pub patterns: Vec<RegisteredPattern>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Validate and register one pattern.
    pub fn add(&mut self, pattern: Pattern) -> Result<(), PatternValidationError> {
        validate_pattern(&pattern, |id| self.contains(id))?;
        self.push(pattern);
        self.generation += 1;
        Ok(())
    }

    /// Register each pattern independently. Valid patterns are registered even
    /// when others are rejected; the error lists the rejected ones.
    pub fn add_many(
        &mut self,
        patterns: impl IntoIterator<Item = Pattern>,
    ) -> Result<(), PatternSetValidationError> {
        let mut errors = Vec::new();
        for pattern in patterns {
            if let Err(error) = self.add(pattern) {
                errors.push(error);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PatternSetValidationError { set: None, errors })
        }
    }

    /// Validate every member of `set` and register all of them, or none.
    pub fn add_set(&mut self, set: PatternSet) -> Result<(), PatternSetValidationError> {
        let PatternSet {
            name,
            patterns,
            enabled,
            priority,
        } = set;

        let members: Vec<Pattern> = patterns
            .into_iter()
            .map(|mut pattern| {
                pattern.priority = pattern.priority.saturating_add(priority);
                pattern.enabled &= enabled;
                pattern
            })
            .collect();

        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        for pattern in &members {
            let duplicate_in_set = !seen.insert(pattern.id.clone());
            let result = validate_pattern(pattern, |id| self.contains(id) || duplicate_in_set);
            if let Err(error) = result {
                errors.push(error);
            }
        }
        if !errors.is_empty() {
            return Err(PatternSetValidationError {
                set: Some(name),
                errors,
            });
        }

        let count = members.len();
        for pattern in members {
            self.push(pattern);
        }
        self.generation += 1;
        debug!(set = %name, count, "registered pattern set");
        Ok(())
    }

    /// Remove a pattern by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|entry| entry.pattern.id != id);
        let removed = self.patterns.len() != before;
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// All patterns in registration order.
    pub fn list(&self) -> Vec<Arc<Pattern>> {
        self.patterns.iter().map(|e| Arc::clone(&e.pattern)).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Pattern>> {
        self.patterns
            .iter()
            .find(|e| e.pattern.id == id)
            .map(|e| Arc::clone(&e.pattern))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.patterns.iter().any(|e| e.pattern.id == id)
    }

    /// Enabled patterns ordered by priority (descending), then registration order.
    pub fn snapshot(&self) -> PatternSnapshot {
        let mut patterns: Vec<RegisteredPattern> = self
            .patterns
            .iter()
            .filter(|e| e.pattern.enabled)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| {
            b.pattern
                .priority
                .cmp(&a.pattern.priority)
                .then(a.order.cmp(&b.order))
        });
        PatternSnapshot {
            generation: self.generation,
            patterns,
        }
    }

    fn push(&mut self, pattern: Pattern) {
        debug!(id = %pattern.id, priority = pattern.priority, "registered pattern");
        self.patterns.push(RegisteredPattern {
            pattern: Arc::new(pattern),
            order: self.next_order,
        });
        self.next_order += 1;
    }
}

/// Check every structural constraint of `pattern`, collecting all violations.
pub fn validate_pattern(
    pattern: &Pattern,
    is_taken: impl Fn(&str) -> bool,
) -> Result<(), PatternValidationError> {
    let mut issues = Vec::new();

    if pattern.id.trim().is_empty() {
        issues.push(ValidationIssue::MissingField { field: "id" });
    } else if is_taken(&pattern.id) {
        issues.push(ValidationIssue::DuplicateId);
    }

    if pattern.selector.trim().is_empty() {
        issues.push(ValidationIssue::MissingField { field: "selector" });
    } else if let Err(source) = Selector::parse(&pattern.selector) {
        issues.push(ValidationIssue::InvalidSelector {
            field: "selector",
            source,
        });
    }

    if pattern.attribute.trim().is_empty() {
        issues.push(ValidationIssue::MissingField { field: "attribute" });
    }

    match &pattern.matcher {
        TextMatcher::Literal(text) if text.is_empty() => {
            issues.push(ValidationIssue::MissingField { field: "matcher" });
        }
        TextMatcher::Literal(_) => {}
        TextMatcher::Regex(source) if source.is_empty() => {
            issues.push(ValidationIssue::MissingField { field: "matcher" });
        }
        TextMatcher::Regex(source) => match regex::Regex::new(source) {
            Ok(re) if re.is_match("") => issues.push(ValidationIssue::InvalidRegex {
                field: "matcher",
                message: "pattern matches the empty string".to_string(),
            }),
            Ok(_) => {}
            Err(err) => issues.push(ValidationIssue::InvalidRegex {
                field: "matcher",
                message: err.to_string(),
            }),
        },
    }

    if let Replacement::Literal(text) = &pattern.replacement {
        if text.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "replacement",
            });
        }
    }

    if pattern.priority < 0 {
        issues.push(ValidationIssue::NegativePriority {
            priority: pattern.priority,
        });
    }

    if pattern.max_matches == Some(0) {
        issues.push(ValidationIssue::InvalidCombo {
            message: "max_matches must be at least 1".to_string(),
        });
    }

    for tag in pattern
        .tag_scope
        .include
        .iter()
        .chain(&pattern.tag_scope.exclude)
    {
        if tag.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "tag_scope",
            });
        }
    }

    for selector in pattern
        .parent_scope
        .include
        .iter()
        .chain(&pattern.parent_scope.exclude)
    {
        if let Err(source) = Selector::parse(selector) {
            issues.push(ValidationIssue::InvalidSelector {
                field: "parent_scope",
                source,
            });
        }
    }

    for condition in &pattern.conditions {
        validate_condition(condition, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PatternValidationError {
            pattern_id: Some(pattern.id.clone()),
            issues,
        })
    }
}

fn validate_condition(condition: &Condition, issues: &mut Vec<ValidationIssue>) {
    match &condition.kind {
        ConditionKind::Attribute(name) if name.trim().is_empty() => {
            issues.push(ValidationIssue::MissingField {
                field: "condition.target",
            });
        }
        ConditionKind::Parent(selector) | ConditionKind::Sibling(selector) => {
            if let Err(source) = Selector::parse(selector) {
                issues.push(ValidationIssue::InvalidSelector {
                    field: "condition.target",
                    source,
                });
            }
        }
        _ => {}
    }

    if matches!(condition.kind, ConditionKind::Custom(_)) {
        return;
    }

    match (&condition.operator, &condition.value) {
        (ConditionOperator::Exists, _) => {}
        (_, None) => issues.push(ValidationIssue::InvalidCombo {
            message: format!("condition operator {:?} requires a value", condition.operator),
        }),
        (ConditionOperator::Matches, Some(ConditionValue::Literal(source)))
        | (_, Some(ConditionValue::Regex(source))) => {
            if let Err(err) = regex::Regex::new(source) {
                issues.push(ValidationIssue::InvalidRegex {
                    field: "condition.value",
                    message: err.to_string(),
                });
            }
        }
        _ => {}
    }
}
