//! The per-document rewrite pipeline.
//!
//! Registry → matcher (per enabled pattern, priority descending) → detector
//! (per element attribute) → resolver → applier → serialization. One call
//! handles one document on the calling thread; the registry is only read.

use crate::apply::{rebuild_value, replacement_text, ReplacementRecord};
use crate::cache::MatchCache;
use crate::conflict::{detect, resolve, ConflictRecord, ResolutionStrategy};
use crate::document::{Document, NodeId};
use crate::fileio::{HtmlRewriteError, RewriteOperation};
use crate::matcher::{CompiledPattern, Match};
use crate::pattern::{
    Pattern, PatternRegistry, PatternSet, PatternSetValidationError, PatternSnapshot,
    PatternValidationError,
};
use crate::validate::validate_edit;
use crate::RewriteError;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Name used in errors for content that did not come from a file.
pub const MEMORY_SOURCE: &str = "<memory>";

#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Re-parse the output and reject rewrites that break the markup
    pub validate_output: bool,
    /// Resolve every conflict with this strategy instead of the recommended one
    pub resolution_override: Option<ResolutionStrategy>,
}

/// Result of rewriting one document.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteResult {
    pub success: bool,
    #[serde(skip)]
    pub original_content: String,
    #[serde(skip)]
    pub modified_content: String,
    pub applied: Vec<ReplacementRecord>,
    pub skipped: Vec<SkippedMatch>,
    pub conflicts: Vec<ConflictRecord>,
    pub stats: RewriteStats,
    pub errors: Vec<RewriteIssue>,
    pub warnings: Vec<RewriteIssue>,
}

/// A match that was found but not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedMatch {
    pub pattern_id: String,
    pub reason: String,
    pub element_selector: String,
    pub matched_text: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteIssue {
    pub pattern_id: Option<String>,
    pub element_selector: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteStats {
    pub patterns: BTreeMap<String, PatternStats>,
    pub elements: ElementStats,
    pub timing: Timing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatternStats {
    /// Elements examined after selector filtering
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub conflicts: usize,
    pub skipped: usize,
}

/// Distribution of rewritten elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementStats {
    pub modified: usize,
    pub by_depth: BTreeMap<usize, usize>,
    pub by_tag: BTreeMap<String, usize>,
}

/// Milliseconds spent per pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Timing {
    pub parse_ms: f64,
    pub match_ms: f64,
    pub resolve_ms: f64,
    pub apply_ms: f64,
    pub total_ms: f64,
}

impl RewriteResult {
    pub fn changed(&self) -> bool {
        self.original_content != self.modified_content
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Owns the pattern registry and its derived caches.
#[derive(Debug, Default)]
pub struct RewriteEngine {
    registry: RwLock<PatternRegistry>,
    cache: MatchCache,
    options: RewriteOptions,
}

impl RewriteEngine {
    pub fn new(options: RewriteOptions) -> Self {
        Self::with_registry(PatternRegistry::new(), options)
    }

    pub fn with_registry(registry: PatternRegistry, options: RewriteOptions) -> Self {
        Self {
            registry: RwLock::new(registry),
            cache: MatchCache::new(),
            options,
        }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    pub fn add(&self, pattern: Pattern) -> Result<(), PatternValidationError> {
        self.registry.write().add(pattern)?;
        self.cache.invalidate();
        Ok(())
    }

    pub fn add_many(&self, patterns: Vec<Pattern>) -> Result<(), PatternSetValidationError> {
        let result = self.registry.write().add_many(patterns);
        self.cache.invalidate();
        result
    }

    pub fn add_set(&self, set: PatternSet) -> Result<(), PatternSetValidationError> {
        self.registry.write().add_set(set)?;
        self.cache.invalidate();
        Ok(())
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.registry.write().remove(id);
        if removed {
            self.cache.invalidate();
        }
        removed
    }

    pub fn list(&self) -> Vec<Arc<Pattern>> {
        self.registry.read().list()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Pattern>> {
        self.registry.read().get(id)
    }

    pub fn generation(&self) -> u64 {
        self.registry.read().generation()
    }

    /// Hold the registry read lock; mutations block until the guard is dropped.
    pub fn read_registry(&self) -> RwLockReadGuard<'_, PatternRegistry> {
        self.registry.read()
    }

    pub fn snapshot(&self) -> PatternSnapshot {
        self.registry.read().snapshot()
    }

    /// Drop compiled regexes and cached match spans.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Rewrite `content` with the currently registered patterns.
    pub fn rewrite_str(&self, content: &str) -> Result<RewriteResult, RewriteError> {
        let snapshot = self.snapshot();
        self.rewrite_with(&snapshot, MEMORY_SOURCE, content)
    }

    /// Rewrite `content` with a fixed pattern snapshot.
    ///
    /// Pattern and element failures are recorded in the result. Only a failure
    /// to serialize, or output that fails validation, is returned as an error.
    pub fn rewrite_with(
        &self,
        snapshot: &PatternSnapshot,
        file: &str,
        content: &str,
    ) -> Result<RewriteResult, RewriteError> {
        let started = Instant::now();
        let mut stats = RewriteStats::default();

        let stage = Instant::now();
        let mut doc = Document::parse(content);
        stats.timing.parse_ms = elapsed_ms(stage);

        let mut run = self.rewrite_document(snapshot, &mut doc, &mut stats);

        let modified_content = if run.applied.is_empty() {
            content.to_string()
        } else {
            doc.serialize()
                .map_err(|e| HtmlRewriteError::new(file, RewriteOperation::Transform, e))?
        };

        if self.options.validate_output && modified_content != content {
            validate_edit(file, content, &modified_content)?;
        }

        stats.timing.total_ms = elapsed_ms(started);
        run.warnings.extend(
            doc.diagnostics()
                .iter()
                .map(|d| RewriteIssue {
                    pattern_id: None,
                    element_selector: None,
                    message: format!("input markup: {d}"),
                }),
        );

        debug!(
            file,
            applied = run.applied.len(),
            skipped = run.skipped.len(),
            conflicts = run.conflicts.len(),
            "document rewritten"
        );

        Ok(RewriteResult {
            success: run.errors.is_empty(),
            original_content: content.to_string(),
            modified_content,
            applied: run.applied,
            skipped: run.skipped,
            conflicts: run.conflicts,
            stats,
            errors: run.errors,
            warnings: run.warnings,
        })
    }

    /// Match, resolve and apply every pattern of `snapshot` to `doc` in place.
    pub fn rewrite_document(
        &self,
        snapshot: &PatternSnapshot,
        doc: &mut Document,
        stats: &mut RewriteStats,
    ) -> DocumentRun {
        self.cache.sync(snapshot.generation);
        let mut run = DocumentRun::default();

        let stage = Instant::now();
        let mut compiled = Vec::with_capacity(snapshot.patterns.len());
        for entry in &snapshot.patterns {
            let pattern_stats = stats.patterns.entry(entry.pattern.id.clone()).or_default();
            match CompiledPattern::compile(entry, snapshot.generation, &self.cache) {
                Ok(pattern) => compiled.push(pattern),
                Err(err) => {
                    pattern_stats.failures += 1;
                    run.errors.push(RewriteIssue {
                        pattern_id: Some(entry.pattern.id.clone()),
                        element_selector: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        // (element, attribute) -> matches, in pattern priority order
        let mut groups: BTreeMap<(NodeId, String), Vec<Match>> = BTreeMap::new();
        for pattern in &compiled {
            let found = pattern.find_matches(doc, &self.cache);
            let pattern_stats = stats.patterns.entry(pattern.pattern.id.clone()).or_default();
            pattern_stats.attempts += found.examined;
            for m in found.matches {
                groups
                    .entry((m.element, m.attribute.clone()))
                    .or_default()
                    .push(m);
            }
        }
        stats.timing.match_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let mut plans = Vec::with_capacity(groups.len());
        for ((element, attribute), mut matches) in groups {
            matches.sort_by(|a, b| {
                a.start
                    .cmp(&b.start)
                    .then(b.end.cmp(&a.end))
                    .then(b.priority.cmp(&a.priority))
                    .then(a.order.cmp(&b.order))
            });
            let selector = doc.selector_path(element);
            let plan = self.resolve_group(&selector, matches, stats, &mut run);
            plans.push((element, attribute, selector, plan));
        }
        stats.timing.resolve_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let by_id: HashMap<&str, &CompiledPattern> = compiled
            .iter()
            .map(|c| (c.pattern.id.as_str(), c))
            .collect();
        let mut touched = HashSet::new();
        for (element, attribute, selector, plan) in plans {
            let applied = apply_group(doc, element, &attribute, &selector, plan, &by_id, stats, &mut run);
            if applied && touched.insert(element) {
                if let Some(el) = doc.element_ref(element) {
                    stats.elements.modified += 1;
                    *stats.elements.by_depth.entry(el.depth()).or_default() += 1;
                    *stats
                        .elements
                        .by_tag
                        .entry(el.tag().to_ascii_lowercase())
                        .or_default() += 1;
                }
            }
        }
        stats.timing.apply_ms = elapsed_ms(stage);

        run
    }

    /// Detect and resolve conflicts among one attribute's matches.
    fn resolve_group(
        &self,
        selector: &str,
        matches: Vec<Match>,
        stats: &mut RewriteStats,
        run: &mut DocumentRun,
    ) -> GroupPlan {
        let mut dropped: Vec<Option<String>> = vec![None; matches.len()];
        let mut in_conflict = vec![false; matches.len()];

        for conflict in detect(&matches, selector) {
            for id in conflict.pattern_ids() {
                stats.patterns.entry(id.to_string()).or_default().conflicts += 1;
            }
            for &member in &conflict.members {
                in_conflict[member] = true;
            }

            match resolve(&conflict, self.options.resolution_override) {
                Ok(outcome) => {
                    for (position, &member) in conflict.members.iter().enumerate() {
                        if !outcome.kept.contains(&position) && dropped[member].is_none() {
                            dropped[member] = Some(format!(
                                "{} conflict ({}): {}",
                                conflict.overlap_type, outcome.resolution, outcome.reason
                            ));
                        }
                    }
                    if outcome.tie {
                        run.warnings.push(RewriteIssue {
                            pattern_id: None,
                            element_selector: Some(selector.to_string()),
                            message: outcome.reason.clone(),
                        });
                    }
                    if !outcome.success {
                        warn!(element = selector, reason = %outcome.reason, "conflict left unresolved");
                    }
                    run.conflicts.push(ConflictRecord { conflict, outcome });
                }
                Err(err) => {
                    for &member in &conflict.members {
                        dropped[member].get_or_insert_with(|| format!("conflict resolution failed: {err}"));
                    }
                    run.errors.push(RewriteIssue {
                        pattern_id: None,
                        element_selector: Some(selector.to_string()),
                        message: err.to_string(),
                    });
                }
            }
        }

        // Residual overlaps between survivors of different conflicts.
        let mut last: Option<usize> = None;
        for i in 0..matches.len() {
            if dropped[i].is_some() {
                continue;
            }
            if let Some(prev) = last {
                if matches[i].start < matches[prev].end {
                    dropped[i] = Some(format!(
                        "overlaps '{}' [{}, {}) which is applied",
                        matches[prev].pattern_id, matches[prev].start, matches[prev].end
                    ));
                    in_conflict[i] = true;
                    continue;
                }
            }
            last = Some(i);
        }

        let mut plan = GroupPlan::default();
        for (i, m) in matches.into_iter().enumerate() {
            match dropped[i].take() {
                Some(reason) => {
                    stats.patterns.entry(m.pattern_id.clone()).or_default().skipped += 1;
                    run.skipped.push(SkippedMatch {
                        pattern_id: m.pattern_id,
                        reason,
                        element_selector: selector.to_string(),
                        matched_text: m.matched_text,
                        offset: m.start,
                    });
                }
                None => plan.winners.push((m, in_conflict[i])),
            }
        }
        plan
    }
}

/// Records accumulated while rewriting one document.
#[derive(Debug, Default)]
pub struct DocumentRun {
    pub applied: Vec<ReplacementRecord>,
    pub skipped: Vec<SkippedMatch>,
    pub conflicts: Vec<ConflictRecord>,
    pub errors: Vec<RewriteIssue>,
    pub warnings: Vec<RewriteIssue>,
}

/// Disjoint winning matches of one attribute, by ascending start.
#[derive(Debug, Default)]
struct GroupPlan {
    winners: Vec<(Match, bool)>,
}

/// Rewrite one attribute from its winning matches. Returns whether anything changed.
#[allow(clippy::too_many_arguments)]
fn apply_group(
    doc: &mut Document,
    element: NodeId,
    attribute: &str,
    selector: &str,
    plan: GroupPlan,
    by_id: &HashMap<&str, &CompiledPattern>,
    stats: &mut RewriteStats,
    run: &mut DocumentRun,
) -> bool {
    if plan.winners.is_empty() {
        return false;
    }

    let (new_value, records) = {
        let Some(el) = doc.element_ref(element) else {
            return false;
        };
        let Some(value) = el.attr(attribute) else {
            return false;
        };

        let mut texts = Vec::with_capacity(plan.winners.len());
        for (m, had_conflict) in &plan.winners {
            let Some(compiled) = by_id.get(m.pattern_id.as_str()) else {
                continue;
            };
            match replacement_text(compiled, m, &el, value) {
                Ok(text) => texts.push((m, text, *had_conflict)),
                Err(err) => {
                    stats.patterns.entry(m.pattern_id.clone()).or_default().failures += 1;
                    run.errors.push(RewriteIssue {
                        pattern_id: Some(m.pattern_id.clone()),
                        element_selector: Some(selector.to_string()),
                        message: format!("replacement failed: {err}"),
                    });
                }
            }
        }

        let spans: Vec<(&Match, &str)> = texts.iter().map(|(m, t, _)| (*m, t.as_str())).collect();
        match rebuild_value(value, &spans) {
            Ok(new_value) => {
                let records: Vec<ReplacementRecord> = texts
                    .iter()
                    .map(|(m, text, had_conflict)| ReplacementRecord::new(m, &el, text.clone(), *had_conflict))
                    .collect();
                (new_value, records)
            }
            Err(err) => {
                for (m, _, _) in &texts {
                    stats.patterns.entry(m.pattern_id.clone()).or_default().failures += 1;
                }
                run.errors.push(RewriteIssue {
                    pattern_id: None,
                    element_selector: Some(selector.to_string()),
                    message: format!("could not rebuild '{attribute}': {err}"),
                });
                return false;
            }
        }
    };

    if records.is_empty() {
        return false;
    }
    if let Err(err) = doc.set_attr(element, attribute, &new_value) {
        run.errors.push(RewriteIssue {
            pattern_id: None,
            element_selector: Some(selector.to_string()),
            message: err.to_string(),
        });
        return false;
    }

    for record in &records {
        stats.patterns.entry(record.pattern_id.clone()).or_default().successes += 1;
    }
    run.applied.extend(records);
    true
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
