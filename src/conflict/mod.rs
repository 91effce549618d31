//! Overlap classification and deterministic resolution of competing matches.

pub mod detector;
pub mod errors;
pub mod resolver;

pub use detector::detect;
pub use errors::ConflictResolutionError;
pub use resolver::resolve;

use crate::matcher::Match;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapType {
    Exact,
    Nested,
    Partial,
    Adjacent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    HighestPriority,
    Merge,
    Split,
    ManualReview,
}

impl OverlapType {
    pub fn base_severity(self) -> Severity {
        match self {
            OverlapType::Exact => Severity::High,
            OverlapType::Nested | OverlapType::Partial => Severity::Medium,
            OverlapType::Adjacent => Severity::Low,
        }
    }

    pub fn recommended_resolution(self) -> ResolutionStrategy {
        match self {
            OverlapType::Exact => ResolutionStrategy::HighestPriority,
            OverlapType::Adjacent => ResolutionStrategy::Merge,
            OverlapType::Nested => ResolutionStrategy::Split,
            OverlapType::Partial => ResolutionStrategy::ManualReview,
        }
    }
}

impl Severity {
    /// One level up, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }
}

/// Two or more matches competing for overlapping or touching text of one attribute.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub element_selector: String,
    pub attribute: String,
    pub matches: Vec<Match>,
    pub overlap_type: OverlapType,
    pub severity: Severity,
    pub recommended_resolution: ResolutionStrategy,
    /// Positions of `matches` in the slice handed to [`detect`]
    #[serde(skip)]
    pub members: Vec<usize>,
}

impl Conflict {
    pub fn pattern_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for m in &self.matches {
            if !ids.contains(&m.pattern_id.as_str()) {
                ids.push(&m.pattern_id);
            }
        }
        ids
    }
}

/// What the resolver decided for one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionOutcome {
    pub resolution: ResolutionStrategy,
    pub chosen_pattern_ids: Vec<String>,
    /// Indices into [`Conflict::matches`] that survive
    pub kept: Vec<usize>,
    pub reason: String,
    pub success: bool,
    /// Several patterns shared the winning priority
    pub tie: bool,
}

/// A conflict together with its resolution, as reported in a rewrite result.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    #[serde(flatten)]
    pub conflict: Conflict,
    pub outcome: ResolutionOutcome,
}

impl fmt::Display for OverlapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlapType::Exact => "exact",
            OverlapType::Nested => "nested",
            OverlapType::Partial => "partial",
            OverlapType::Adjacent => "adjacent",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionStrategy::HighestPriority => "highest-priority",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Split => "split",
            ResolutionStrategy::ManualReview => "manual-review",
        };
        f.write_str(name)
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest-priority" => Ok(ResolutionStrategy::HighestPriority),
            "merge" => Ok(ResolutionStrategy::Merge),
            "split" => Ok(ResolutionStrategy::Split),
            "manual-review" => Ok(ResolutionStrategy::ManualReview),
            other => Err(format!(
                "unknown resolution strategy '{other}' (expected highest-priority, merge, split or manual-review)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_saturates() {
        assert_eq!(Severity::Low.escalate(), Severity::Medium);
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    #[test]
    fn recommendation_follows_overlap_type() {
        assert_eq!(
            OverlapType::Exact.recommended_resolution(),
            ResolutionStrategy::HighestPriority
        );
        assert_eq!(OverlapType::Adjacent.recommended_resolution(), ResolutionStrategy::Merge);
        assert_eq!(OverlapType::Nested.recommended_resolution(), ResolutionStrategy::Split);
        assert_eq!(
            OverlapType::Partial.recommended_resolution(),
            ResolutionStrategy::ManualReview
        );
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [
            ResolutionStrategy::HighestPriority,
            ResolutionStrategy::Merge,
            ResolutionStrategy::Split,
            ResolutionStrategy::ManualReview,
        ] {
            assert_eq!(strategy.to_string().parse::<ResolutionStrategy>(), Ok(strategy));
        }
        assert!("first".parse::<ResolutionStrategy>().is_err());
    }
}
