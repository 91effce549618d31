use thiserror::Error;

/// The resolver could not evaluate a conflict. An unresolved manual-review
/// conflict is an ordinary outcome, not this error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolutionError {
    #[error("conflict on {element_selector} has {count} match(es); at least 2 are required")]
    TooFewMatches {
        element_selector: String,
        count: usize,
    },

    #[error("conflict on {element_selector} mixes attributes '{first}' and '{second}'")]
    MixedAttributes {
        element_selector: String,
        first: String,
        second: String,
    },
}
