use crate::conflict::ResolutionStrategy;
use crate::fileio::BackupMode;
use crate::pattern::{
    validate_pattern, Condition, ConditionKind, ConditionOperator, ConditionValue, Pattern,
    PatternSet, PatternValidationError, Replacement, Scope, TextMatcher,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RewriterConfig {
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub sets: Vec<SetDefinition>,
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
    #[serde(default)]
    pub mapping: Option<Mapping>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
    pub create_backup: bool,
    pub backup_suffix: String,
    pub backup_mode: BackupMode,
    pub max_file_size: u64,
    pub timeout_ms: u64,
    pub dry_run: bool,
    /// Default for patterns that do not set it
    pub case_sensitive: bool,
    /// Default for patterns that do not set it
    pub whole_word_only: bool,
    pub concurrency: usize,
    pub continue_on_error: bool,
    pub validate_output: bool,
    /// Settle every conflict with this strategy instead of the recommended one
    pub resolution: Option<ResolutionStrategy>,
    /// File extensions picked up when walking directories
    pub extensions: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_backup: false,
            backup_suffix: ".bak".to_string(),
            backup_mode: BackupMode::Simple,
            max_file_size: crate::fileio::DEFAULT_MAX_FILE_SIZE,
            timeout_ms: 30_000,
            dry_run: false,
            case_sensitive: true,
            whole_word_only: true,
            concurrency: 4,
            continue_on_error: true,
            validate_output: true,
            resolution: None,
            extensions: vec!["html".to_string(), "htm".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SetDefinition {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatternDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub selector: String,
    #[serde(default = "default_attribute")]
    pub attribute: String,
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub whole_word_only: Option<bool>,
    #[serde(default)]
    pub multiple_matches: Option<bool>,
    #[serde(default)]
    pub max_matches: Option<usize>,
    #[serde(default)]
    pub preserve_case: bool,
    #[serde(default)]
    pub escape_replacement: bool,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub tag_include: Vec<String>,
    #[serde(default)]
    pub tag_exclude: Vec<String>,
    #[serde(default)]
    pub parent_include: Vec<String>,
    #[serde(default)]
    pub parent_exclude: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConditionDefinition {
    pub kind: ConditionKindName,
    /// Attribute name for `attribute`, selector for `parent`/`sibling`
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub operator: Option<OperatorName>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionKindName {
    Attribute,
    Text,
    Tag,
    Parent,
    Sibling,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorName {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
}

/// Name mapping produced by an external name generator.
#[derive(Debug, Deserialize, Clone)]
pub struct Mapping {
    #[serde(default = "default_mapping_selector")]
    pub selector: String,
    #[serde(default = "default_attribute")]
    pub attribute: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_attribute() -> String {
    "class".to_string()
}

fn default_mapping_selector() -> String {
    "[class]".to_string()
}

/// Id prefix of patterns generated from `[mapping]`.
pub const MAPPING_PREFIX: &str = "map:";

impl RewriterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let options = &self.options;

        let mapping_empty = self.mapping.as_ref().map_or(true, |m| m.names.is_empty());
        if self.sets.is_empty() && self.patterns.is_empty() && mapping_empty {
            issues.push(ValidationIssue::EmptyPatternList);
        }
        if options.concurrency == 0 {
            issues.push(ValidationIssue::InvalidOption {
                field: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if options.max_file_size == 0 {
            issues.push(ValidationIssue::InvalidOption {
                field: "max_file_size",
                message: "must be greater than 0".to_string(),
            });
        }
        if options.timeout_ms == 0 {
            issues.push(ValidationIssue::InvalidOption {
                field: "timeout_ms",
                message: "must be greater than 0".to_string(),
            });
        }
        if options.create_backup && options.backup_suffix.trim().is_empty() {
            issues.push(ValidationIssue::InvalidOption {
                field: "backup_suffix",
                message: "must not be empty when backups are enabled".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut check = |definition: Option<&PatternDefinition>,
                         pattern: &Pattern,
                         issues: &mut Vec<ValidationIssue>| {
            if let Some(definition) = definition {
                definition.check(issues);
            }
            let taken = !seen.insert(pattern.id.clone());
            if let Err(error) = validate_pattern(pattern, |_| taken) {
                issues.push(ValidationIssue::Pattern(error));
            }
        };

        for set in &self.sets {
            if set.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    pattern_id: None,
                    field: "sets.name",
                });
            }
            for definition in &set.patterns {
                let mut pattern = definition.to_pattern(options);
                pattern.priority = pattern.priority.saturating_add(set.priority);
                check(Some(definition), &pattern, &mut issues);
            }
        }
        for definition in &self.patterns {
            check(Some(definition), &definition.to_pattern(options), &mut issues);
        }
        if let Some(mapping) = &self.mapping {
            for (from, to) in &mapping.names {
                if to.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        pattern_id: Some(format!("{MAPPING_PREFIX}{from}")),
                        field: "mapping.names value",
                    });
                    continue;
                }
                check(None, &mapping.to_pattern(from, to), &mut issues);
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Configured sets, in file order.
    pub fn pattern_sets(&self) -> Vec<PatternSet> {
        self.sets
            .iter()
            .map(|set| PatternSet {
                name: set.name.clone(),
                patterns: set
                    .patterns
                    .iter()
                    .map(|p| p.to_pattern(&self.options))
                    .collect(),
                enabled: set.enabled,
                priority: set.priority,
            })
            .collect()
    }

    /// Standalone patterns followed by mapping patterns.
    pub fn loose_patterns(&self) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .patterns
            .iter()
            .map(|p| p.to_pattern(&self.options))
            .collect();
        if let Some(mapping) = &self.mapping {
            patterns.extend(
                mapping
                    .names
                    .iter()
                    .map(|(from, to)| mapping.to_pattern(from, to)),
            );
        }
        patterns
    }
}

impl PatternDefinition {
    /// Problems the pattern validator cannot see once the definition is converted.
    fn check(&self, issues: &mut Vec<ValidationIssue>) {
        let pattern_id = Some(self.id.clone()).filter(|id| !id.is_empty());
        if self.literal.is_some() && self.regex.is_some() {
            issues.push(ValidationIssue::InvalidCombo {
                pattern_id: pattern_id.clone(),
                message: "set either 'literal' or 'regex', not both".to_string(),
            });
        }
        for condition in &self.conditions {
            let needs_target = matches!(
                condition.kind,
                ConditionKindName::Attribute | ConditionKindName::Parent | ConditionKindName::Sibling
            );
            if needs_target && condition.target.as_deref().unwrap_or("").trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    pattern_id: pattern_id.clone(),
                    field: "conditions.target",
                });
            }
            if condition.value.is_some() && condition.regex.is_some() {
                issues.push(ValidationIssue::InvalidCombo {
                    pattern_id: pattern_id.clone(),
                    message: "condition sets both 'value' and 'regex'".to_string(),
                });
            }
        }
    }

    pub fn to_pattern(&self, options: &Options) -> Pattern {
        let matcher = match (&self.regex, &self.literal) {
            (Some(regex), _) => TextMatcher::Regex(regex.clone()),
            (None, Some(literal)) => TextMatcher::Literal(literal.clone()),
            (None, None) => TextMatcher::Literal(String::new()),
        };
        let is_regex = matches!(matcher, TextMatcher::Regex(_));

        Pattern {
            id: self.id.clone(),
            selector: self.selector.clone(),
            attribute: self.attribute.clone(),
            matcher,
            replacement: Replacement::Literal(self.replacement.clone()),
            conditions: self.conditions.iter().map(ConditionDefinition::to_condition).collect(),
            case_sensitive: self.case_sensitive.unwrap_or(options.case_sensitive),
            // Regexes carry their own boundaries unless asked otherwise.
            whole_word_only: self
                .whole_word_only
                .unwrap_or(options.whole_word_only && !is_regex),
            multiple_matches: self.multiple_matches.unwrap_or(true),
            max_matches: self.max_matches,
            preserve_case: self.preserve_case,
            escape_replacement: self.escape_replacement,
            run_once: self.run_once,
            priority: self.priority,
            enabled: self.enabled.unwrap_or(true),
            tag_scope: Scope {
                include: self.tag_include.clone(),
                exclude: self.tag_exclude.clone(),
            },
            parent_scope: Scope {
                include: self.parent_include.clone(),
                exclude: self.parent_exclude.clone(),
            },
        }
    }
}

impl ConditionDefinition {
    pub fn to_condition(&self) -> Condition {
        let target = self.target.clone().unwrap_or_default();
        let kind = match self.kind {
            ConditionKindName::Attribute => ConditionKind::Attribute(target),
            ConditionKindName::Text => ConditionKind::Text,
            ConditionKindName::Tag => ConditionKind::Tag,
            ConditionKindName::Parent => ConditionKind::Parent(target),
            ConditionKindName::Sibling => ConditionKind::Sibling(target),
        };
        let value = match (&self.regex, &self.value) {
            (Some(regex), _) => Some(ConditionValue::Regex(regex.clone())),
            (None, Some(value)) => Some(ConditionValue::Literal(value.clone())),
            (None, None) => None,
        };
        let operator = match (self.operator, &value) {
            (Some(operator), _) => operator.into(),
            (None, Some(ConditionValue::Regex(_))) => ConditionOperator::Matches,
            (None, Some(ConditionValue::Literal(_))) => ConditionOperator::Equals,
            (None, None) => ConditionOperator::Exists,
        };
        Condition {
            kind,
            operator,
            value,
            negate: self.negate,
        }
    }
}

impl From<OperatorName> for ConditionOperator {
    fn from(name: OperatorName) -> Self {
        match name {
            OperatorName::Equals => ConditionOperator::Equals,
            OperatorName::Contains => ConditionOperator::Contains,
            OperatorName::StartsWith => ConditionOperator::StartsWith,
            OperatorName::EndsWith => ConditionOperator::EndsWith,
            OperatorName::Matches => ConditionOperator::Matches,
            OperatorName::Exists => ConditionOperator::Exists,
        }
    }
}

impl Mapping {
    /// A whole-word literal pattern replacing `from` with `to`.
    pub fn to_pattern(&self, from: &str, to: &str) -> Pattern {
        Pattern::literal(
            format!("{MAPPING_PREFIX}{from}"),
            self.selector.clone(),
            self.attribute.clone(),
            from,
            to,
        )
        .with_priority(self.priority)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatternList,
    MissingField {
        pattern_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        pattern_id: Option<String>,
        message: String,
    },
    InvalidOption {
        field: &'static str,
        message: String,
    },
    Pattern(PatternValidationError),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatternList => write!(f, "config defines no patterns"),
            ValidationIssue::MissingField { pattern_id, field } => match pattern_id {
                Some(id) => write!(f, "pattern '{id}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { pattern_id, message } => match pattern_id {
                Some(id) => write!(f, "pattern '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid pattern configuration: {message}"),
            },
            ValidationIssue::InvalidOption { field, message } => {
                write!(f, "option '{field}' {message}")
            }
            ValidationIssue::Pattern(error) => write!(f, "{error}"),
        }
    }
}
