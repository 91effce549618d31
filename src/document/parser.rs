//! Span-preserving start-tag scanner.
//!
//! Tree construction belongs to html5ever (through `scraper`); this pass only
//! records where every start tag and attribute value sits in the source so
//! the serializer can splice new values in without re-printing anything
//! else. It also notices markup problems worth reporting.

use crate::document::errors::{DiagnosticKind, ParseDiagnostic};
use crate::document::{AttrSpan, Attribute, ValueSpan};
use std::ops::Range;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content the tree builder reads as text.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Elements whose end tag HTML allows to be omitted.
const OPTIONAL_CLOSE: &[&str] = &[
    "html", "head", "body", "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th",
    "thead", "tbody", "tfoot", "colgroup", "rb", "rp", "rt", "rtc",
];

/// One start tag as written in the source.
#[derive(Debug, Clone)]
pub(crate) struct SourceTag {
    pub(crate) tag: String,
    pub(crate) attributes: Vec<Attribute>,
    /// Byte range of the whole start tag
    pub(crate) start_tag: Range<usize>,
    /// End of the tag name
    pub(crate) name_end: usize,
    /// Offset of the `>` or `/>` that ends the start tag
    pub(crate) insert_at: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Scan {
    pub(crate) tags: Vec<SourceTag>,
    pub(crate) diagnostics: Vec<ParseDiagnostic>,
}

pub(crate) fn scan(source: &str) -> Scan {
    let mut scanner = Scanner {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        open: Vec::new(),
        scan: Scan::default(),
    };
    scanner.run();
    scanner.scan
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Open elements by (lowercase tag, start offset); only feeds diagnostics
    open: Vec<(String, usize)>,
    scan: Scan,
}

impl<'a> Scanner<'a> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'<' {
                let rest = &self.src[self.pos..];
                if rest.starts_with("<!--") {
                    self.skip_construct(4, "-->", DiagnosticKind::UnterminatedComment);
                } else if rest.starts_with("<![CDATA[") {
                    self.skip_construct(9, "]]>", DiagnosticKind::UnterminatedComment);
                } else if rest.starts_with("<!") || rest.starts_with("<?") {
                    self.skip_construct(2, ">", DiagnosticKind::UnterminatedTag);
                } else if rest.starts_with("</") && self.is_alpha_at(self.pos + 2) {
                    self.end_tag();
                } else if self.is_alpha_at(self.pos + 1) {
                    self.start_tag();
                } else {
                    self.skip_text(self.pos + 1);
                }
            } else {
                self.skip_text(self.pos);
            }
        }

        for (tag, offset) in std::mem::take(&mut self.open) {
            if !is_one_of(&tag, OPTIONAL_CLOSE) {
                self.diagnose(DiagnosticKind::UnclosedElement, offset, Some(tag));
            }
        }
    }

    fn is_alpha_at(&self, idx: usize) -> bool {
        self.bytes.get(idx).is_some_and(u8::is_ascii_alphabetic)
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.src.get(from..)?.find(needle).map(|i| from + i)
    }

    fn skip_text(&mut self, from: usize) {
        self.pos = self.find_from(from, "<").unwrap_or(self.bytes.len());
    }

    fn skip_construct(&mut self, opener: usize, terminator: &str, kind: DiagnosticKind) {
        let start = self.pos;
        self.pos = match self.find_from(start + opener, terminator) {
            Some(idx) => idx + terminator.len(),
            None => {
                self.diagnose(kind, start, None);
                self.bytes.len()
            }
        };
    }

    fn end_tag(&mut self) {
        let start = self.pos;
        let name_start = start + 2;
        let name_end = self.scan_name(name_start);
        let name = self.src[name_start..name_end].to_ascii_lowercase();

        self.pos = match self.find_from(name_end, ">") {
            Some(idx) => idx + 1,
            None => {
                self.diagnose(DiagnosticKind::UnterminatedTag, start, Some(name.clone()));
                self.bytes.len()
            }
        };

        match self.open.iter().rposition(|(tag, _)| *tag == name) {
            Some(idx) => self.open.truncate(idx),
            None => self.diagnose(DiagnosticKind::StrayEndTag, start, Some(name)),
        }
    }

    fn start_tag(&mut self) {
        let start = self.pos;
        let name_start = start + 1;
        let name_end = self.scan_name(name_start);
        let tag = self.src[name_start..name_end].to_string();

        let mut attributes = Vec::new();
        let mut pos = name_end;
        let mut self_closing = false;
        let insert_at;

        loop {
            pos = self.skip_whitespace(pos);
            match self.bytes.get(pos) {
                None => {
                    self.diagnose(DiagnosticKind::UnterminatedTag, start, Some(tag.clone()));
                    insert_at = self.bytes.len();
                    break;
                }
                Some(b'>') => {
                    insert_at = pos;
                    pos += 1;
                    break;
                }
                Some(b'/') if self.bytes.get(pos + 1) == Some(&b'>') => {
                    insert_at = pos;
                    self_closing = true;
                    pos += 2;
                    break;
                }
                Some(b'/') => {
                    pos += 1;
                }
                Some(_) => {
                    pos = self.attribute(pos, &mut attributes);
                }
            }
        }
        self.pos = pos;

        let lower = tag.to_ascii_lowercase();
        let raw_text = is_one_of(&lower, RAW_TEXT_ELEMENTS);
        if !self_closing && !is_one_of(&lower, VOID_ELEMENTS) {
            self.open.push((lower.clone(), start));
        }
        self.scan.tags.push(SourceTag {
            tag,
            attributes,
            start_tag: start..pos,
            name_end,
            insert_at,
        });

        if raw_text && !self_closing {
            self.pos = self.find_raw_text_end(&lower).unwrap_or(self.bytes.len());
        }
    }

    /// Parse one attribute starting at `pos`; returns the position after it.
    fn attribute(&mut self, pos: usize, attributes: &mut Vec<Attribute>) -> usize {
        let name_start = pos;
        let mut pos = pos;
        while let Some(&b) = self.bytes.get(pos) {
            if b.is_ascii_whitespace() || b == b'=' || b == b'>' {
                break;
            }
            if b == b'/' && pos > name_start {
                break;
            }
            pos += 1;
        }
        let name_end = pos;
        let name = self.src[name_start..name_end].to_string();

        let after_ws = self.skip_whitespace(pos);
        if self.bytes.get(after_ws) != Some(&b'=') {
            attributes.push(Attribute::parsed(
                name,
                None,
                AttrSpan {
                    name_end,
                    value: None,
                },
            ));
            return pos;
        }

        let value_start = self.skip_whitespace(after_ws + 1);
        let (value_range, quote, next) = match self.bytes.get(value_start) {
            Some(&q) if q == b'"' || q == b'\'' => {
                let inner = value_start + 1;
                match self.find_from(inner, if q == b'"' { "\"" } else { "'" }) {
                    Some(close) => (inner..close, Some(q as char), close + 1),
                    None => {
                        self.diagnose(DiagnosticKind::UnterminatedQuote, value_start, Some(name.clone()));
                        (inner..self.bytes.len(), Some(q as char), self.bytes.len())
                    }
                }
            }
            _ => {
                let mut end = value_start;
                while let Some(&b) = self.bytes.get(end) {
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    end += 1;
                }
                (value_start..end, None, end)
            }
        };

        let value = self.src[value_range.clone()].to_string();
        attributes.push(Attribute::parsed(
            name,
            Some(value),
            AttrSpan {
                name_end,
                value: Some(ValueSpan {
                    range: value_range,
                    quote,
                }),
            },
        ));
        next
    }

    fn find_raw_text_end(&self, lower_tag: &str) -> Option<usize> {
        let lower = self.src.get(self.pos..)?.to_ascii_lowercase();
        let needle = format!("</{lower_tag}");
        lower.find(&needle).map(|idx| self.pos + idx)
    }

    fn scan_name(&self, from: usize) -> usize {
        let mut end = from;
        while let Some(&b) = self.bytes.get(end) {
            if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
                break;
            }
            end += 1;
        }
        end
    }

    fn skip_whitespace(&self, mut pos: usize) -> usize {
        while self.bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        pos
    }

    fn diagnose(&mut self, kind: DiagnosticKind, offset: usize, subject: Option<String>) {
        self.scan.diagnostics.push(ParseDiagnostic {
            kind,
            offset,
            subject,
        });
    }
}

fn is_one_of(tag: &str, set: &[&str]) -> bool {
    set.iter().any(|candidate| tag.eq_ignore_ascii_case(candidate))
}
