use crate::conflict::{Conflict, OverlapType};
use crate::matcher::Match;
use tracing::debug;

/// Groups larger than this escalate the severity of their conflicts.
const ESCALATION_GROUP_SIZE: usize = 3;

/// Classify pairwise overlaps among the matches of one element attribute.
///
/// Matches are walked by ascending start (longer spans first on equal starts);
/// each match is compared with the furthest-reaching earlier match of its
/// connected group. Touching or overlapping matches from one pattern only
/// conflict when they overlap.
pub fn detect(matches: &[Match], element_selector: &str) -> Vec<Conflict> {
    if matches.len() < 2 {
        return Vec::new();
    }

    let order = walk_order(matches);
    let mut conflicts = Vec::new();
    // Group id per conflict, used for escalation.
    let mut conflict_groups = Vec::new();
    let mut group_sizes = Vec::new();

    let mut reach = order[0];
    let mut group_members = 1;
    let mut group = 0;

    for &next in &order[1..] {
        let current = &matches[reach];
        let candidate = &matches[next];

        if candidate.start > current.end {
            group_sizes.push(group_members);
            group += 1;
            group_members = 1;
            reach = next;
            continue;
        }
        group_members += 1;

        if let Some(overlap_type) = classify(current, candidate) {
            let overlapping = overlap_type != OverlapType::Adjacent;
            if overlapping || current.pattern_id != candidate.pattern_id {
                conflicts.push(Conflict {
                    element_selector: element_selector.to_string(),
                    attribute: current.attribute.clone(),
                    matches: vec![current.clone(), candidate.clone()],
                    overlap_type,
                    severity: overlap_type.base_severity(),
                    recommended_resolution: overlap_type.recommended_resolution(),
                    members: vec![reach, next],
                });
                conflict_groups.push(group);
            }
        }

        if candidate.end > current.end {
            reach = next;
        }
    }
    group_sizes.push(group_members);

    for (conflict, group) in conflicts.iter_mut().zip(conflict_groups) {
        if group_sizes[group] > ESCALATION_GROUP_SIZE {
            conflict.severity = conflict.severity.escalate();
        }
        debug!(
            element = %conflict.element_selector,
            overlap = %conflict.overlap_type,
            severity = %conflict.severity,
            patterns = ?conflict.pattern_ids(),
            "conflict detected"
        );
    }
    conflicts
}

/// Geometric relation of `current` (earlier) and `next`; `None` when they are disjoint.
pub fn classify(current: &Match, next: &Match) -> Option<OverlapType> {
    if current.end > next.start && next.end > current.start {
        if current.start == next.start && current.end == next.end {
            Some(OverlapType::Exact)
        } else if contains(current, next) || contains(next, current) {
            Some(OverlapType::Nested)
        } else {
            Some(OverlapType::Partial)
        }
    } else if current.end == next.start {
        Some(OverlapType::Adjacent)
    } else {
        None
    }
}

fn contains(outer: &Match, inner: &Match) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

fn walk_order(matches: &[Match]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&matches[a], &matches[b]);
        a.start
            .cmp(&b.start)
            .then(b.end.cmp(&a.end))
            .then(b.priority.cmp(&a.priority))
            .then(a.order.cmp(&b.order))
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });
    order
}
