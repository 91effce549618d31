use crate::document::SelectorError;
use std::fmt;

/// A pattern failed structural validation. Lists every violated constraint.
#[derive(Debug, Clone)]
pub struct PatternValidationError {
    pub pattern_id: Option<String>,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    NegativePriority {
        priority: i32,
    },
    DuplicateId,
    InvalidSelector {
        field: &'static str,
        source: SelectorError,
    },
    InvalidRegex {
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        message: String,
    },
}

/// One or more patterns of a bulk registration failed validation.
#[derive(Debug, Clone)]
pub struct PatternSetValidationError {
    /// Set name, for `add_set`
    pub set: Option<String>,
    pub errors: Vec<PatternValidationError>,
}

impl PatternValidationError {
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for PatternValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pattern_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => write!(f, "pattern '{id}' is invalid:")?,
            None => write!(f, "pattern is invalid:")?,
        }
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PatternValidationError {}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::NegativePriority { priority } => {
                write!(f, "priority must be >= 0 (got {priority})")
            }
            ValidationIssue::DuplicateId => write!(f, "id is already registered"),
            ValidationIssue::InvalidSelector { field, source } => {
                write!(f, "'{field}' is not a valid selector: {source}")
            }
            ValidationIssue::InvalidRegex { field, message } => {
                write!(f, "'{field}' is not a valid regex: {message}")
            }
            ValidationIssue::InvalidCombo { message } => write!(f, "{message}"),
        }
    }
}

impl fmt::Display for PatternSetValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.set {
            Some(name) => write!(
                f,
                "pattern set '{name}' rejected ({} invalid pattern(s))",
                self.errors.len()
            )?,
            None => write!(f, "{} pattern(s) rejected", self.errors.len())?,
        }
        for error in &self.errors {
            write!(f, "\n{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PatternSetValidationError {}
