//! Arena document model.
//!
//! html5ever builds the tree; the arena keeps the elements that were written
//! in the source, in document order, linked by plain indices. The original
//! source is kept alongside: serialization re-emits it byte-for-byte except
//! for attribute values that were changed through [`Document::set_attr`].

pub mod errors;
mod parser;
pub mod selector;
mod tree;

pub use errors::{DiagnosticKind, DocumentError, ParseDiagnostic, SelectorError};
pub use selector::Selector;

use crate::edit::{apply_edits, Edit};
use std::collections::HashMap;
use std::ops::Range;

/// Index into the [`Document`]'s node arena.
pub type NodeId = usize;

/// The document root; never an element.
pub const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    html: scraper::Html,
    nodes: Vec<Node>,
    /// html5ever node to arena element
    handles: HashMap<ego_tree::NodeId, NodeId>,
    diagnostics: Vec<ParseDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Distance from the root (top-level elements have depth 1)
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element(Element),
    /// Character data with entities decoded
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Tag name as written in the source
    pub tag: String,
    pub attributes: Vec<Attribute>,
    /// Byte range of the whole start tag
    pub start_tag: Range<usize>,
    /// Offset of the `>` or `/>` that ends the start tag; new attributes go here
    pub insert_at: usize,
    pub(crate) handle: ego_tree::NodeId,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    /// Current value, as written in the source (entities are not decoded)
    pub value: String,
    /// Where the attribute came from; `None` for attributes added after parsing
    pub(crate) span: Option<AttrSpan>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttrSpan {
    pub(crate) name_end: usize,
    pub(crate) value: Option<ValueSpan>,
}

#[derive(Debug, Clone)]
pub(crate) struct ValueSpan {
    /// Range of the value text, excluding quotes
    pub(crate) range: Range<usize>,
    pub(crate) quote: Option<char>,
}

impl Attribute {
    pub(crate) fn parsed(name: String, value: Option<String>, span: AttrSpan) -> Self {
        Self {
            name,
            value: value.unwrap_or_default(),
            span: Some(span),
        }
    }
}

impl Document {
    /// Parse markup into a document. Parsing never fails; structural problems
    /// are reported through [`Document::diagnostics`].
    pub fn parse(source: &str) -> Self {
        tree::build(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// All element ids in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Element(_)))
            .map(|(id, _)| id)
    }

    /// Element ids matching `selector`, in document order.
    pub fn query(&self, selector: &Selector) -> Vec<NodeId> {
        self.html
            .select(selector.compiled())
            .filter_map(|element| self.handles.get(&element.id()).copied())
            .collect()
    }

    /// Parse `selector` and return matching elements.
    pub fn query_str(&self, selector: &str) -> Result<Vec<ElementRef<'_>>, SelectorError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .query(&selector)
            .into_iter()
            .map(|id| ElementRef { doc: self, id })
            .collect())
    }

    pub fn element_ref(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.element(id).map(|_| ElementRef { doc: self, id })
    }

    /// The html5ever element behind an arena element, for selector matching.
    pub(crate) fn scraper_element(&self, id: NodeId) -> Option<scraper::ElementRef<'_>> {
        let handle = self.element(id)?.handle;
        self.html.tree.get(handle).and_then(scraper::ElementRef::wrap)
    }

    /// Attribute value; exact name match first, then ASCII case-insensitive.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let element = self.element(id)?;
        find_attribute(&element.attributes, name).map(|idx| element.attributes[idx].value.as_str())
    }

    /// Set an attribute value, creating the attribute if it does not exist.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        if name.is_empty()
            || name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '='))
        {
            return Err(DocumentError::InvalidAttributeName(name.to_string()));
        }
        let node = self.nodes.get_mut(id).ok_or(DocumentError::UnknownNode(id))?;
        let NodeKind::Element(element) = &mut node.kind else {
            return Err(DocumentError::NotAnElement(id));
        };
        match find_attribute(&element.attributes, name) {
            Some(idx) => element.attributes[idx].value = value.to_string(),
            None => element.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
                span: None,
            }),
        }
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    /// Nearest ancestor that is an element.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.element(p).is_some())
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .copied()
                    .filter(|&c| self.element(c).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn preceding_element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let siblings = self.parent(id).map(|p| self.element_children(p)).unwrap_or_default();
        let pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
        siblings[..pos].to_vec()
    }

    fn following_element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let siblings = self.parent(id).map(|p| self.element_children(p)).unwrap_or_default();
        match siblings.iter().position(|&s| s == id) {
            Some(pos) => siblings[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Element siblings (excluding `id`) that match `selector`.
    pub fn siblings(&self, id: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut out = self.preceding_element_siblings(id);
        out.extend(self.following_element_siblings(id));
        out.retain(|&s| selector.matches(self, s));
        out
    }

    /// Concatenated character data of all descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Root | NodeKind::Element(_) => {
                for &child in &node.children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// A selector path that identifies `id`, e.g. `html > body > div:nth-child(2)`.
    pub fn selector_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(element) = self.element(node_id) else {
                break;
            };
            let siblings = self
                .parent(node_id)
                .map(|p| self.element_children(p))
                .unwrap_or_default();
            let same_tag = siblings
                .iter()
                .filter(|&&s| self.element(s).is_some_and(|e| e.tag.eq_ignore_ascii_case(&element.tag)))
                .count();
            let segment = if same_tag > 1 {
                let index = siblings.iter().position(|&s| s == node_id).unwrap_or(0) + 1;
                format!("{}:nth-child({index})", element.tag)
            } else {
                element.tag.clone()
            };
            segments.push(segment);
            current = self.parent_element(node_id);
        }
        segments.reverse();
        segments.join(" > ")
    }

    /// Re-emit the document, splicing in every changed attribute value.
    pub fn serialize(&self) -> Result<String, DocumentError> {
        let mut edits = Vec::new();
        for node in &self.nodes {
            let NodeKind::Element(element) = &node.kind else {
                continue;
            };
            for attribute in &element.attributes {
                if let Some(edit) = self.attribute_edit(element, attribute) {
                    edits.push(edit);
                }
            }
        }
        Ok(apply_edits(&self.source, edits)?)
    }

    fn attribute_edit(&self, element: &Element, attribute: &Attribute) -> Option<Edit> {
        match &attribute.span {
            None => Some(Edit::insertion(
                element.insert_at,
                format!(" {}={}", attribute.name, quoted(&attribute.value)),
            )),
            Some(AttrSpan {
                name_end,
                value: None,
            }) => {
                if attribute.value.is_empty() {
                    return None;
                }
                Some(Edit::insertion(
                    *name_end,
                    format!("={}", quoted(&attribute.value)),
                ))
            }
            Some(AttrSpan {
                value: Some(span), ..
            }) => {
                let original = &self.source[span.range.clone()];
                if original == attribute.value {
                    return None;
                }
                let new_text = match span.quote {
                    Some(quote) => escape_quote(&attribute.value, quote),
                    None => quoted(&attribute.value),
                };
                Some(Edit::new(span.range.start, span.range.end, new_text, original))
            }
        }
    }
}

/// Borrowed view of one element, handed to conditions and computed replacements.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> ElementRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn tag(&self) -> &'a str {
        self.doc.element(self.id).map(|e| e.tag.as_str()).unwrap_or_default()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.doc.attr(self.id, name)
    }

    pub fn attributes(&self) -> &'a [Attribute] {
        self.doc
            .element(self.id)
            .map(|e| e.attributes.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self) -> Option<ElementRef<'a>> {
        self.doc.parent_element(self.id).map(|id| ElementRef { doc: self.doc, id })
    }

    pub fn ancestors(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.parent(), |e| e.parent())
    }

    pub fn siblings(&self, selector: &Selector) -> Vec<ElementRef<'a>> {
        self.doc
            .siblings(self.id, selector)
            .into_iter()
            .map(|id| ElementRef { doc: self.doc, id })
            .collect()
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self.doc, self.id)
    }

    pub fn text(&self) -> String {
        self.doc.text_content(self.id)
    }

    pub fn depth(&self) -> usize {
        self.doc.node(self.id).map(|n| n.depth).unwrap_or_default()
    }

    pub fn selector_path(&self) -> String {
        self.doc.selector_path(self.id)
    }
}

fn find_attribute(attributes: &[Attribute], name: &str) -> Option<usize> {
    attributes
        .iter()
        .position(|a| a.name == name)
        .or_else(|| attributes.iter().position(|a| a.name.eq_ignore_ascii_case(name)))
}

fn escape_quote(value: &str, quote: char) -> String {
    match quote {
        '"' => value.replace('"', "&quot;"),
        _ => value.replace('\'', "&#39;"),
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", escape_quote(value, '"'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(doc: &Document, tag: &str) -> NodeId {
        doc.elements()
            .find(|&id| doc.element(id).is_some_and(|e| e.tag == tag))
            .unwrap()
    }

    #[test]
    fn untouched_document_round_trips_exactly() {
        let src = "<!doctype html>\n<div  class = 'a b'  id=x>\n  <img src=a.png>\n</div>\n";
        let doc = Document::parse(src);
        assert_eq!(doc.serialize().unwrap(), src);
    }

    #[test]
    fn set_attr_splices_only_the_value() {
        let src = "<div  class = 'a b'  id=x>text</div>";
        let mut doc = Document::parse(src);
        let div = first(&doc, "div");
        doc.set_attr(div, "class", "c").unwrap();
        doc.set_attr(div, "id", "y z").unwrap();
        assert_eq!(
            doc.serialize().unwrap(),
            "<div  class = 'c'  id=\"y z\">text</div>"
        );
    }

    #[test]
    fn set_attr_escapes_delimiting_quote() {
        let mut doc = Document::parse("<p class=\"a\"></p>");
        let p = first(&doc, "p");
        doc.set_attr(p, "class", "say \"hi\"").unwrap();
        assert_eq!(doc.serialize().unwrap(), "<p class=\"say &quot;hi&quot;\"></p>");
    }

    #[test]
    fn set_attr_creates_missing_attributes() {
        let mut doc = Document::parse("<br/><input disabled>");
        let br = first(&doc, "br");
        let input = first(&doc, "input");
        doc.set_attr(br, "class", "x").unwrap();
        doc.set_attr(input, "disabled", "disabled").unwrap();
        assert_eq!(
            doc.serialize().unwrap(),
            "<br class=\"x\"/><input disabled=\"disabled\">"
        );
    }

    #[test]
    fn set_attr_rejects_bad_targets() {
        let mut doc = Document::parse("<p>text</p>");
        assert!(matches!(
            doc.set_attr(ROOT, "class", "x"),
            Err(DocumentError::NotAnElement(ROOT))
        ));
        assert!(matches!(
            doc.set_attr(999, "class", "x"),
            Err(DocumentError::UnknownNode(999))
        ));
        let p = first(&doc, "p");
        assert!(matches!(
            doc.set_attr(p, "bad name", "x"),
            Err(DocumentError::InvalidAttributeName(_))
        ));
    }

    #[test]
    fn navigation_helpers() {
        let doc = Document::parse(
            "<main><section class=\"s\"><p>a</p><p class=\"t\">b<i>c</i></p></section></main>",
        );
        let refs = doc.query_str("p.t").unwrap();
        assert_eq!(refs.len(), 1);
        let p = refs[0];
        assert_eq!(p.text(), "bc");
        assert_eq!(p.parent().unwrap().tag(), "section");
        assert_eq!(p.ancestors().count(), 2);
        assert_eq!(p.depth(), 3);
        assert_eq!(p.siblings(&Selector::parse("p").unwrap()).len(), 1);
        assert_eq!(p.selector_path(), "main > section > p:nth-child(2)");
    }

    #[test]
    fn omitted_end_tags_close_the_open_element() {
        let doc = Document::parse("<ul><li class=\"x\">a<li class=\"x\">b</ul>");
        let items = doc.query_str("ul > li").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text(), "a");
        assert_eq!(items[1].parent().unwrap().tag(), "ul");
        assert_eq!(items[1].depth(), 2);

        let doc = Document::parse("<body><p class=\"x\">one<p class=\"x\">two<div>three</div></body>");
        let paragraphs = doc.query_str("body > p").unwrap();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[1].text(), "two");
        let div = doc.query_str("div").unwrap()[0];
        assert_eq!(div.parent().unwrap().tag(), "body");
        assert_eq!(div.selector_path(), "body > div");

        let doc = Document::parse("<dl><dt>t<dd class=\"d\">d<dt>u</dl><select><option>1<option class=\"o\">2</select>");
        assert_eq!(doc.query_str("dl > dd").unwrap().len(), 1);
        assert_eq!(doc.query_str("dl > dt").unwrap().len(), 2);
        assert_eq!(doc.query_str("select > option.o").unwrap()[0].text(), "2");
    }

    #[test]
    fn void_and_self_closing_elements_do_not_nest() {
        let doc = Document::parse("<div><img src=a.png><br/><input disabled /><span></span></div>");
        let div = first(&doc, "div");
        assert_eq!(doc.element_children(div).len(), 4);
        assert!(doc.diagnostics().is_empty());
    }

    #[test]
    fn text_content_decodes_entities() {
        let doc = Document::parse("<p class=\"a&amp;b\">fish &amp; chips</p>");
        let p = doc.query_str("p").unwrap()[0];
        assert_eq!(p.text(), "fish & chips");
        assert_eq!(p.attr("class"), Some("a&amp;b"));
        assert_eq!(doc.query_str("[class=\"a&b\"]").unwrap().len(), 1);
    }

    #[test]
    fn attribute_lookup_falls_back_to_case_insensitive() {
        let doc = Document::parse("<div CLASS=\"a\" className=\"b\"></div>");
        let div = first(&doc, "div");
        assert_eq!(doc.attr(div, "CLASS"), Some("a"));
        assert_eq!(doc.attr(div, "class"), Some("a"));
        assert_eq!(doc.attr(div, "className"), Some("b"));
    }
}
