//! Map html5ever's tree back onto source spans.
//!
//! Every scanned start tag is tagged with a marker attribute holding its
//! index before the markup goes through `scraper::Html::parse_document`. Each
//! element in the resulting tree that carries a marker came from that source
//! tag; elements without one were implied by the tree builder (`html`,
//! `tbody`, ...) and are left out of the arena. Source tags that never show up
//! in the tree were discarded by the tree builder and are reported.

use crate::document::errors::{DiagnosticKind, ParseDiagnostic};
use crate::document::parser::{self, SourceTag};
use crate::document::{Document, Element, Node, NodeId, NodeKind, ROOT};
use scraper::Html;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Attribute carrying the source tag index through the tree builder.
pub(crate) const SOURCE_MARKER: &str = "data-class-rewriter-source";

pub(crate) fn build(source: &str) -> Document {
    let scan = parser::scan(source);
    let html = Html::parse_document(&mark_start_tags(source, &scan.tags));
    let mut diagnostics = scan.diagnostics;

    let mut pending: Vec<Option<SourceTag>> = scan.tags.into_iter().map(Some).collect();
    let mut nodes = vec![Node {
        kind: NodeKind::Root,
        parent: None,
        children: Vec::new(),
        depth: 0,
    }];
    let mut handles = HashMap::new();

    let mut stack = vec![(html.tree.root(), ROOT)];
    while let Some((node, parent)) = stack.pop() {
        let mut container = parent;
        match node.value() {
            scraper::Node::Element(element) => {
                // A marker seen twice belongs to a copy made by the adoption agency.
                let source_tag = element
                    .attr(SOURCE_MARKER)
                    .and_then(|index| index.parse::<usize>().ok())
                    .and_then(|index| pending.get_mut(index))
                    .and_then(Option::take);
                if let Some(source_tag) = source_tag {
                    let id = push_node(
                        &mut nodes,
                        parent,
                        NodeKind::Element(Element {
                            tag: source_tag.tag,
                            attributes: source_tag.attributes,
                            start_tag: source_tag.start_tag,
                            insert_at: source_tag.insert_at,
                            handle: node.id(),
                        }),
                    );
                    handles.insert(node.id(), id);
                    container = id;
                }
            }
            scraper::Node::Text(text) => push_text(&mut nodes, parent, text.text.as_ref()),
            _ => {}
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push((child, container));
        }
    }

    for source_tag in pending.into_iter().flatten() {
        diagnostics.push(ParseDiagnostic {
            kind: DiagnosticKind::DiscardedElement,
            offset: source_tag.start_tag.start,
            subject: Some(source_tag.tag),
        });
    }
    diagnostics.sort_by_key(|d| d.offset);

    Document {
        source: source.to_string(),
        html,
        nodes,
        handles,
        diagnostics,
    }
}

/// Insert the marker right after each tag name, keeping everything else.
fn mark_start_tags(source: &str, tags: &[SourceTag]) -> String {
    let mut marked = String::with_capacity(source.len() + tags.len() * (SOURCE_MARKER.len() + 8));
    let mut last = 0;
    for (index, tag) in tags.iter().enumerate() {
        marked.push_str(&source[last..tag.name_end]);
        let _ = write!(marked, " {SOURCE_MARKER}=\"{index}\"");
        last = tag.name_end;
    }
    marked.push_str(&source[last..]);
    marked
}

fn push_node(nodes: &mut Vec<Node>, parent: NodeId, kind: NodeKind) -> NodeId {
    let id = nodes.len();
    let depth = nodes[parent].depth + 1;
    nodes.push(Node {
        kind,
        parent: Some(parent),
        children: Vec::new(),
        depth,
    });
    nodes[parent].children.push(id);
    id
}

fn push_text(nodes: &mut Vec<Node>, parent: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(&last) = nodes[parent].children.last() {
        if let NodeKind::Text(prev) = &mut nodes[last].kind {
            prev.push_str(text);
            return;
        }
    }
    push_node(nodes, parent, NodeKind::Text(text.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_of(doc: &Document) -> Vec<String> {
        doc.elements()
            .filter_map(|id| doc.element(id).map(|e| e.tag.clone()))
            .collect()
    }

    #[test]
    fn markers_follow_each_tag_name() {
        let src = "<div class=a><br/></div>";
        let scan = parser::scan(src);
        assert_eq!(
            mark_start_tags(src, &scan.tags),
            format!("<div {SOURCE_MARKER}=\"0\" class=a><br {SOURCE_MARKER}=\"1\"/></div>")
        );
    }

    #[test]
    fn implied_elements_stay_out_of_the_arena() {
        let doc = build("<table><tr class=\"r\"><td>x</td></tr></table>");
        assert_eq!(tags_of(&doc), ["table", "tr", "td"]);
        let tr = doc.query_str("tr").unwrap()[0];
        assert_eq!(tr.parent().unwrap().tag(), "table");
        assert_eq!(tr.depth(), 2);
        // html5ever inserts the tbody the selector has to name.
        assert_eq!(doc.query_str("tbody > tr").unwrap().len(), 1);
        assert!(doc.query_str("table > tr").unwrap().is_empty());
    }

    #[test]
    fn markers_never_leak_into_output() {
        let src = "<p class=\"a\">x</p>";
        let mut doc = build(src);
        let p = doc.elements().next().unwrap();
        assert!(doc.attr(p, SOURCE_MARKER).is_none());
        doc.set_attr(p, "class", "b").unwrap();
        assert_eq!(doc.serialize().unwrap(), "<p class=\"b\">x</p>");
    }

    #[test]
    fn misnested_formatting_keeps_one_element_per_tag() {
        let doc = build("<b class=\"x\">1<p class=\"y\">2</b>3</p>");
        assert_eq!(tags_of(&doc), ["b", "p"]);
        assert!(doc.diagnostics().iter().all(|d| d.kind != DiagnosticKind::DiscardedElement));
    }

    #[test]
    fn tags_dropped_by_the_tree_builder_are_reported() {
        let doc = build("<div><tr class=\"r\"><td>x</td></tr></div>");
        let discarded: Vec<_> = doc
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::DiscardedElement)
            .filter_map(|d| d.subject.clone())
            .collect();
        assert_eq!(discarded, ["tr", "td"]);
        assert_eq!(tags_of(&doc), ["div"]);
    }
}
