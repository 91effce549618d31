mod build;
pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    ConditionDefinition, ConditionKindName, Mapping, OperatorName, Options, PatternDefinition,
    RewriterConfig, SetDefinition, ValidationError, ValidationIssue, MAPPING_PREFIX,
};
