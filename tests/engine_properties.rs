//! End-to-end behaviour of the rewrite engine on in-memory documents
//!
//! Covers priority, adjacency and nesting conflicts, validation reporting and
//! run-to-run determinism.

use class_rewriter::{
    OverlapType, Pattern, RewriteEngine, RewriteOptions, RewriteResult, ResolutionStrategy,
};
use proptest::prelude::*;
use std::sync::Arc;

fn engine(patterns: Vec<Pattern>) -> RewriteEngine {
    let engine = RewriteEngine::new(RewriteOptions {
        validate_output: true,
        ..RewriteOptions::default()
    });
    for pattern in patterns {
        engine.add(pattern).unwrap();
    }
    engine
}

fn class_of(html: &str) -> String {
    let doc = class_rewriter::Document::parse(html);
    let found = doc.query_str("[class]").unwrap();
    found[0].attr("class").unwrap().to_string()
}

#[test]
fn higher_priority_wins_exact_overlap() {
    let engine = engine(vec![
        Pattern::literal("low", "button", "class", "btn", "low-btn").with_priority(5),
        Pattern::literal("high", "button", "class", "btn", "high-btn").with_priority(10),
    ]);
    let result = engine
        .rewrite_str(r#"<button class="btn">Go</button>"#)
        .unwrap();

    assert_eq!(class_of(&result.modified_content), "high-btn");
    assert_eq!(result.conflicts.len(), 1);
    let record = &result.conflicts[0];
    assert_eq!(record.conflict.overlap_type, OverlapType::Exact);
    let mut ids = record.conflict.pattern_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec!["high", "low"]);
    assert_eq!(record.outcome.resolution, ResolutionStrategy::HighestPriority);
    assert_eq!(record.outcome.chosen_pattern_ids, vec!["high".to_string()]);

    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].pattern_id, "low");
    assert!(result.applied[0].had_conflict);
}

#[test]
fn adjacent_matches_both_apply_in_order() {
    let engine = engine(vec![
        Pattern::literal("foo", "div", "class", "foo", "F").anywhere(),
        Pattern::literal("bar", "div", "class", "bar", "B").anywhere(),
    ]);
    let result = engine
        .rewrite_str(r#"<div class="foobar"></div>"#)
        .unwrap();

    assert_eq!(result.modified_content, r#"<div class="FB"></div>"#);
    assert_eq!(result.applied.len(), 2);
    assert!(result.skipped.is_empty());
    assert_eq!(result.conflicts.len(), 1);
    let record = &result.conflicts[0];
    assert_eq!(record.conflict.overlap_type, OverlapType::Adjacent);
    assert_eq!(record.outcome.resolution, ResolutionStrategy::Merge);
    assert!(record.outcome.success);
}

#[test]
fn nested_match_keeps_outer_span() {
    let engine = engine(vec![
        Pattern::literal("outer", "div", "class", "foobar", "A"),
        Pattern::literal("inner", "div", "class", "oob", "B")
            .anywhere()
            .with_priority(50),
    ]);
    let result = engine
        .rewrite_str(r#"<div class="foobar"></div>"#)
        .unwrap();

    assert_eq!(result.modified_content, r#"<div class="A"></div>"#);
    assert_eq!(result.conflicts[0].conflict.overlap_type, OverlapType::Nested);
    assert_eq!(result.conflicts[0].outcome.resolution, ResolutionStrategy::Split);
    assert_eq!(result.skipped.len(), 1);
    let skipped = &result.skipped[0];
    assert_eq!(skipped.pattern_id, "inner");
    assert_eq!(skipped.matched_text, "oob");
    assert_eq!(skipped.offset, 1);
    assert!(skipped.reason.contains("nested"), "{}", skipped.reason);
}

#[test]
fn partial_overlap_is_left_for_review() {
    let engine = engine(vec![
        Pattern::literal("ab", "div", "class", "ab", "X").anywhere(),
        Pattern::literal("bc", "div", "class", "bc", "Y").anywhere(),
    ]);
    let result = engine.rewrite_str(r#"<div class="abc"></div>"#).unwrap();

    assert_eq!(result.modified_content, r#"<div class="abc"></div>"#);
    assert!(!result.changed());
    assert_eq!(result.conflicts[0].conflict.overlap_type, OverlapType::Partial);
    assert!(!result.conflicts[0].outcome.success);
    assert_eq!(result.skipped.len(), 2);
}

#[test]
fn resolution_override_applies_to_every_conflict() {
    let engine = RewriteEngine::new(RewriteOptions {
        validate_output: true,
        resolution_override: Some(ResolutionStrategy::Merge),
    });
    engine
        .add(Pattern::literal("ab", "div", "class", "ab", "X").anywhere())
        .unwrap();
    engine
        .add(Pattern::literal("bc", "div", "class", "bc", "Y").anywhere())
        .unwrap();
    let result = engine.rewrite_str(r#"<div class="abc"></div>"#).unwrap();

    assert_eq!(result.modified_content, r#"<div class="Xc"></div>"#);
    assert_eq!(result.conflicts[0].outcome.resolution, ResolutionStrategy::Merge);
}

#[test]
fn invalid_pattern_lists_every_problem() {
    let engine = RewriteEngine::default();
    let err = engine
        .add(Pattern::literal("", "", "class", "x", "y"))
        .unwrap_err();
    let messages = err.messages();
    assert!(messages.len() >= 2, "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("'id'")));
    assert!(messages.iter().any(|m| m.contains("'selector'")));
    assert!(engine.list().is_empty());
}

#[test]
fn markup_outside_rewritten_values_is_untouched() {
    let html = "<!DOCTYPE html>\n<ul id='nav'>\n  <li class=\"item  active\" data-x=1>One</li>\n  <!-- item -->\n  <li class='item'>Two\n</ul>\n";
    let engine = engine(vec![Pattern::literal("item", "li", "class", "item", "i")]);
    let result = engine.rewrite_str(html).unwrap();
    assert_eq!(
        result.modified_content,
        "<!DOCTYPE html>\n<ul id='nav'>\n  <li class=\"i  active\" data-x=1>One</li>\n  <!-- item -->\n  <li class='i'>Two\n</ul>\n"
    );
    assert_eq!(result.stats.elements.modified, 2);
    assert_eq!(result.stats.elements.by_tag["li"], 2);
}

#[test]
fn registry_changes_invalidate_cached_matches() {
    let engine = engine(vec![Pattern::literal("btn", "[class]", "class", "btn", "b")]);
    let html = r#"<a class="btn"></a>"#;
    assert_eq!(engine.rewrite_str(html).unwrap().modified_content, r#"<a class="b"></a>"#);

    assert!(engine.remove("btn"));
    engine
        .add(Pattern::literal("btn", "[class]", "class", "btn", "button"))
        .unwrap();
    assert_eq!(
        engine.rewrite_str(html).unwrap().modified_content,
        r#"<a class="button"></a>"#
    );
}

#[test]
fn shared_engine_rewrites_concurrently() {
    let engine = Arc::new(engine(vec![
        Pattern::literal("flex", "[class]", "class", "flex", "f"),
        Pattern::regex("col", "[class]", "class", r"col-(\d+)", "c$1"),
    ]));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let html = format!(r#"<div class="flex col-{i}"></div>"#);
                engine.rewrite_str(&html).unwrap().modified_content
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!(r#"<div class="f c{i}"></div>"#));
    }
}

fn competing_patterns() -> Vec<Pattern> {
    vec![
        Pattern::literal("foo", "div", "class", "foo", "F").anywhere(),
        Pattern::literal("bar", "div", "class", "bar", "B").anywhere(),
        Pattern::literal("foobar", "div", "class", "foobar", "FB").with_priority(2),
        Pattern::literal("oba", "div", "class", "oba", "O").anywhere().with_priority(1),
        Pattern::regex("btn", "div", "class", r"btn(-\w+)?", "b$1"),
        Pattern::literal("btn-lg", "div", "class", "btn-lg", "L").with_priority(3),
    ]
}

fn fingerprint(result: &RewriteResult) -> (String, String, String) {
    (
        result.modified_content.clone(),
        serde_json::to_string(&result.conflicts).unwrap(),
        serde_json::to_string(&result.skipped).unwrap(),
    )
}

proptest! {
    #[test]
    fn rewriting_is_deterministic(
        words in prop::collection::vec(
            prop::sample::select(vec!["foo", "bar", "foobar", "btn", "btn-lg", "x", "foobarbar"]),
            1..8,
        )
    ) {
        let html = format!(r#"<div class="{}"><div class="{}"></div></div>"#, words.join(" "), words.concat());
        let first = engine(competing_patterns()).rewrite_str(&html).unwrap();
        let second = engine(competing_patterns()).rewrite_str(&html).unwrap();
        prop_assert_eq!(fingerprint(&first), fingerprint(&second));

        let reused = engine(competing_patterns());
        let a = reused.rewrite_str(&html).unwrap();
        let b = reused.rewrite_str(&html).unwrap();
        prop_assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}
