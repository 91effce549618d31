//! Class Rewriter: pattern-driven rewriting of HTML attribute values
//!
//! Patterns select elements with a CSS-style selector, find text inside one
//! attribute (usually `class`) and replace it. Everything a run does is
//! reported: which replacements were applied, which were skipped and why,
//! which patterns competed for the same characters and how that was settled.
//!
//! # Architecture
//!
//! [`PatternRegistry`] → [`matcher`] → [`conflict`] detection and resolution
//! → [`apply`] → serialization. Value rewrites compile down to the [`Edit`]
//! primitive: a verified byte-span replacement applied in a single pass, so
//! markup outside rewritten attribute values is preserved byte for byte.
//!
//! # Safety
//!
//! - Regexes are compiled once per registry generation
//! - Files over the size limit are never read into memory
//! - Backups are verified before the original is replaced
//! - Atomic file writes (temp file + fsync + rename)
//! - Output is re-parsed and rejected if it introduces markup errors
//!
//! # Example
//!
//! ```
//! use class_rewriter::{Pattern, RewriteEngine, RewriteOptions};
//!
//! let engine = RewriteEngine::new(RewriteOptions::default());
//! engine
//!     .add(Pattern::literal("btn", "button", "class", "btn", "button-base"))
//!     .unwrap();
//!
//! let result = engine
//!     .rewrite_str(r#"<button class="btn primary">Go</button>"#)
//!     .unwrap();
//! assert_eq!(
//!     result.modified_content,
//!     r#"<button class="button-base primary">Go</button>"#
//! );
//! ```

pub mod apply;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod document;
pub mod edit;
pub mod engine;
pub mod fileio;
pub mod matcher;
pub mod pattern;
pub mod validate;

use thiserror::Error;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, RewriterConfig};
pub use conflict::{
    Conflict, ConflictRecord, ConflictResolutionError, OverlapType, ResolutionOutcome,
    ResolutionStrategy, Severity,
};
pub use document::{Document, ElementRef, NodeId, Selector};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use engine::{RewriteEngine, RewriteOptions, RewriteResult, RewriteStats, SkippedMatch};
pub use fileio::{
    BackupError, BatchOperationResult, BatchOptions, BatchProcessor, FileOptions, FileOutcome,
    FileRewriter, FileSystem, HtmlRewriteError, RewriteOperation, StdFileSystem,
};
pub use matcher::Match;
pub use pattern::{
    Pattern, PatternRegistry, PatternSet, PatternSetValidationError, PatternValidationError,
};
pub use validate::HtmlValidationError;

/// Every way a rewrite can fail.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Pattern(#[from] PatternValidationError),
    #[error(transparent)]
    PatternSet(#[from] PatternSetValidationError),
    #[error(transparent)]
    Html(#[from] HtmlRewriteError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Validation(#[from] HtmlValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictResolutionError),
}
