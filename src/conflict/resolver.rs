use crate::conflict::{Conflict, ConflictResolutionError, ResolutionOutcome, ResolutionStrategy};
use crate::matcher::Match;
use tracing::{debug, warn};

/// Decide which matches of `conflict` survive.
///
/// Uses the conflict's recommended strategy unless `strategy` overrides it.
/// A manual-review outcome keeps nothing and reports `success = false`.
pub fn resolve(
    conflict: &Conflict,
    strategy: Option<ResolutionStrategy>,
) -> Result<ResolutionOutcome, ConflictResolutionError> {
    let matches = &conflict.matches;
    if matches.len() < 2 {
        return Err(ConflictResolutionError::TooFewMatches {
            element_selector: conflict.element_selector.clone(),
            count: matches.len(),
        });
    }
    if let Some(other) = matches.iter().find(|m| m.attribute != matches[0].attribute) {
        return Err(ConflictResolutionError::MixedAttributes {
            element_selector: conflict.element_selector.clone(),
            first: matches[0].attribute.clone(),
            second: other.attribute.clone(),
        });
    }

    let resolution = strategy.unwrap_or(conflict.recommended_resolution);
    let outcome = match resolution {
        ResolutionStrategy::HighestPriority => highest_priority(matches),
        ResolutionStrategy::Merge => merge(matches),
        ResolutionStrategy::Split => split(matches),
        ResolutionStrategy::ManualReview => ResolutionOutcome {
            resolution,
            chosen_pattern_ids: Vec::new(),
            kept: Vec::new(),
            reason: format!(
                "{} overlap between {} needs manual review",
                conflict.overlap_type,
                describe(matches)
            ),
            success: false,
            tie: false,
        },
    };

    if outcome.tie {
        warn!(
            element = %conflict.element_selector,
            patterns = ?outcome.chosen_pattern_ids,
            "equal-priority tie; applying the earliest registered pattern"
        );
    }
    debug!(
        element = %conflict.element_selector,
        resolution = %outcome.resolution,
        chosen = ?outcome.chosen_pattern_ids,
        success = outcome.success,
        "conflict resolved"
    );
    Ok(outcome)
}

fn highest_priority(matches: &[Match]) -> ResolutionOutcome {
    let max = matches.iter().map(|m| m.priority).max().unwrap_or_default();
    let tied: Vec<usize> = (0..matches.len())
        .filter(|&i| matches[i].priority == max)
        .collect();

    let mut chosen_pattern_ids: Vec<String> = Vec::new();
    for &i in &tied {
        if !chosen_pattern_ids.contains(&matches[i].pattern_id) {
            chosen_pattern_ids.push(matches[i].pattern_id.clone());
        }
    }

    // Equal priority never displaces the earlier-registered pattern.
    let winner = tied
        .iter()
        .copied()
        .min_by(|&a, &b| {
            matches[a]
                .order
                .cmp(&matches[b].order)
                .then_with(|| matches[a].pattern_id.cmp(&matches[b].pattern_id))
                .then(matches[a].start.cmp(&matches[b].start))
        })
        .unwrap_or(0);

    let tie = chosen_pattern_ids.len() > 1;
    let reason = if tie {
        format!(
            "patterns {} share priority {max}; kept '{}' (registered first)",
            chosen_pattern_ids.join(", "),
            matches[winner].pattern_id
        )
    } else {
        format!(
            "'{}' has the highest priority ({max})",
            matches[winner].pattern_id
        )
    };

    ResolutionOutcome {
        resolution: ResolutionStrategy::HighestPriority,
        chosen_pattern_ids,
        kept: vec![winner],
        reason,
        success: true,
        tie,
    }
}

/// Earliest-start-first interval selection.
fn merge(matches: &[Match]) -> ResolutionOutcome {
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by(|&a, &b| {
        matches[a]
            .start
            .cmp(&matches[b].start)
            .then(matches[a].end.cmp(&matches[b].end))
            .then(matches[a].order.cmp(&matches[b].order))
    });

    let mut kept = Vec::new();
    let mut last_end = 0;
    for i in order {
        if kept.is_empty() || matches[i].start >= last_end {
            last_end = matches[i].end;
            kept.push(i);
        }
    }

    let chosen_pattern_ids = ids_of(matches, &kept);
    let reason = if kept.len() == matches.len() {
        "matches do not overlap; all kept".to_string()
    } else {
        format!("kept {} of {} non-overlapping matches", kept.len(), matches.len())
    };
    ResolutionOutcome {
        resolution: ResolutionStrategy::Merge,
        chosen_pattern_ids,
        kept,
        reason,
        success: true,
        tie: false,
    }
}

/// Keep the outermost span; ties go to the lexicographically lowest pattern id.
fn split(matches: &[Match]) -> ResolutionOutcome {
    let winner = (0..matches.len())
        .min_by(|&a, &b| {
            matches[b]
                .len()
                .cmp(&matches[a].len())
                .then_with(|| matches[a].pattern_id.cmp(&matches[b].pattern_id))
                .then(matches[a].start.cmp(&matches[b].start))
        })
        .unwrap_or(0);

    ResolutionOutcome {
        resolution: ResolutionStrategy::Split,
        chosen_pattern_ids: vec![matches[winner].pattern_id.clone()],
        kept: vec![winner],
        reason: format!(
            "kept outermost match '{}' [{}, {})",
            matches[winner].pattern_id, matches[winner].start, matches[winner].end
        ),
        success: true,
        tie: false,
    }
}

fn ids_of(matches: &[Match], indices: &[usize]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for &i in indices {
        if !ids.contains(&matches[i].pattern_id) {
            ids.push(matches[i].pattern_id.clone());
        }
    }
    ids
}

fn describe(matches: &[Match]) -> String {
    matches
        .iter()
        .map(|m| format!("'{}' [{}, {})", m.pattern_id, m.start, m.end))
        .collect::<Vec<_>>()
        .join(" and ")
}
