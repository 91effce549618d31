//! Rewrite rules and the registry that validates and orders them.

pub mod errors;
pub mod registry;
pub mod schema;

pub use errors::{PatternSetValidationError, PatternValidationError, ValidationIssue};
pub use registry::{validate_pattern, PatternRegistry, PatternSnapshot, RegisteredPattern};
pub use schema::{
    BoxError, ComputeFn, Condition, ConditionKind, ConditionOperator, ConditionValue,
    CustomConditionFn, Pattern, PatternSet, ReplaceContext, Replacement, Scope, TextMatcher,
};
