//! HTML serialization for the email post-processor.
//!
//! Walks a parsed `scraper` document and writes it back out with optional
//! per-node rewrites and html-minifier style whitespace collapsing. Template
//! syntax such as `{{ $name }}` or `@if` survives untouched because text and
//! attributes are only escaped where the browser would otherwise misread
//! them.

use std::collections::{HashMap, HashSet};

use ego_tree::{NodeId, NodeRef};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use lightningcss::targets::{Browsers, Targets};
use scraper::{Html, Node};

use crate::build::styles::process_css;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

const PRESERVE_WHITESPACE: &[&str] = &["pre", "textarea", "script", "style"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "base", "blockquote", "body", "caption", "center", "col",
    "colgroup", "dd", "details", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hr", "html", "legend", "li",
    "link", "main", "meta", "nav", "noscript", "ol", "optgroup", "option", "p", "pre", "script",
    "section", "style", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr",
    "ul",
];

/// Per-node edits applied while serializing.
#[derive(Debug, Default)]
pub struct Rewrites {
    /// Replacement `style` attribute values. An empty value drops the attribute.
    pub styles: HashMap<NodeId, String>,
    /// Replacement text content for `<style>` elements.
    pub style_text: HashMap<NodeId, String>,
    /// Nodes to omit together with their subtree.
    pub removed: HashSet<NodeId>,
}

/// Output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    pub collapse_whitespace: bool,
    pub minify_css: bool,
}

/// Serialize a parsed document.
pub fn serialize(html: &Html, rewrites: &Rewrites, options: SerializeOptions) -> String {
    let mut serializer = Serializer {
        rewrites,
        options,
        out: String::new(),
    };
    for child in html.tree.root().children() {
        serializer.node(child, false);
    }
    serializer.out
}

/// Mail clients render with old engines; keep legacy media query syntax.
fn email_targets() -> Targets {
    Targets::from(Browsers {
        ie: Some(11 << 16),
        safari: Some(8 << 16),
        ..Browsers::default()
    })
}

/// Minify a stylesheet, falling back to the original text when it does not parse.
pub fn minify_stylesheet(css: &str) -> String {
    process_css(css, "inline.css", email_targets(), true).unwrap_or_else(|_| css.trim().to_string())
}

/// Minify the contents of a `style` attribute.
pub fn minify_style_attribute(value: &str) -> String {
    StyleAttribute::parse(value, ParserOptions::default())
        .ok()
        .and_then(|attr| {
            attr.to_css(PrinterOptions {
                minify: true,
                targets: email_targets(),
                ..PrinterOptions::default()
            })
            .ok()
        })
        .map(|result| result.code)
        .unwrap_or_else(|| value.trim().to_string())
}

struct Serializer<'a> {
    rewrites: &'a Rewrites,
    options: SerializeOptions,
    out: String,
}

impl Serializer<'_> {
    fn node(&mut self, node: NodeRef<'_, Node>, preserve: bool) {
        if self.rewrites.removed.contains(&node.id()) {
            return;
        }
        match node.value() {
            Node::Doctype(doctype) => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(doctype.name());
                if !doctype.public_id().is_empty() {
                    self.out.push_str(&format!(" PUBLIC \"{}\"", doctype.public_id()));
                }
                if !doctype.system_id().is_empty() {
                    if doctype.public_id().is_empty() {
                        self.out.push_str(" SYSTEM");
                    }
                    self.out.push_str(&format!(" \"{}\"", doctype.system_id()));
                }
                self.out.push('>');
            }
            Node::Comment(comment) => {
                self.out.push_str("<!--");
                self.out.push_str(comment);
                self.out.push_str("-->");
            }
            Node::Text(text) => self.text(node, text, preserve),
            Node::Element(element) => {
                let name = element.name();
                self.out.push('<');
                self.out.push_str(name);
                for (attr, value) in element.attrs() {
                    let value = if attr == "style" {
                        let style = self.rewrites.styles.get(&node.id()).map_or(value, String::as_str);
                        self.style(style)
                    } else {
                        value.to_string()
                    };
                    if attr == "style" && value.is_empty() {
                        continue;
                    }
                    self.out.push(' ');
                    self.out.push_str(attr);
                    self.out.push_str("=\"");
                    self.out.push_str(&escape_attribute(&value));
                    self.out.push('"');
                }
                // An inlined style may land on an element that had no attribute.
                if element.attr("style").is_none()
                    && let Some(style) = self.rewrites.styles.get(&node.id())
                    && !style.is_empty()
                {
                    let style = self.style(style);
                    self.out.push_str(" style=\"");
                    self.out.push_str(&escape_attribute(&style));
                    self.out.push('"');
                }
                self.out.push('>');

                if VOID_ELEMENTS.contains(&name) {
                    return;
                }

                if RAW_TEXT_ELEMENTS.contains(&name) {
                    let raw: String = match self.rewrites.style_text.get(&node.id()) {
                        Some(text) => text.clone(),
                        None => node
                            .children()
                            .filter_map(|c| c.value().as_text().map(|t| String::from(&**t)))
                            .collect(),
                    };
                    if name == "style" && self.options.minify_css {
                        self.out.push_str(&minify_stylesheet(&raw));
                    } else {
                        self.out.push_str(&raw);
                    }
                } else {
                    let preserve = preserve || PRESERVE_WHITESPACE.contains(&name);
                    for child in node.children() {
                        self.node(child, preserve);
                    }
                }

                self.out.push_str("</");
                self.out.push_str(name);
                self.out.push('>');
            }
            Node::Document | Node::Fragment => {
                for child in node.children() {
                    self.node(child, preserve);
                }
            }
            Node::ProcessingInstruction(_) => {}
        }
    }

    fn style(&self, value: &str) -> String {
        if self.options.minify_css && !value.is_empty() {
            minify_style_attribute(value)
        } else {
            value.to_string()
        }
    }

    fn text(&mut self, node: NodeRef<'_, Node>, text: &str, preserve: bool) {
        if preserve || !self.options.collapse_whitespace {
            self.out.push_str(&escape_text(text));
            return;
        }

        let mut collapsed = collapse_whitespace(text);
        let parent_block = node.parent().is_some_and(is_block);
        if node.prev_sibling().map_or(parent_block, is_block) {
            collapsed = collapsed.trim_start().to_string();
        }
        if node.next_sibling().map_or(parent_block, is_block) {
            collapsed = collapsed.trim_end().to_string();
        }
        self.out.push_str(&escape_text(&collapsed));
    }
}

fn is_block(node: NodeRef<'_, Node>) -> bool {
    match node.value() {
        Node::Element(el) => BLOCK_ELEMENTS.contains(&el.name()),
        Node::Document | Node::Fragment | Node::Doctype(_) => true,
        _ => false,
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// True when the text after `&` would be read as a character reference.
fn starts_reference(rest: &str) -> bool {
    let body = rest.strip_prefix('#').unwrap_or(rest);
    let len = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .count();
    len > 0 && body[len..].starts_with(';')
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        let rest = &text[i + c.len_utf8()..];
        match c {
            '&' if starts_reference(rest) => out.push_str("&amp;"),
            '<' if rest
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')) =>
            {
                out.push_str("&lt;")
            }
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        match c {
            '&' if starts_reference(&value[i + 1..]) => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(html: &str, options: SerializeOptions) -> String {
        let doc = Html::parse_document(html);
        serialize(&doc, &Rewrites::default(), options)
    }

    #[test]
    fn test_doctype_and_void_elements() {
        let out = roundtrip(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><img src=\"a.png\"><br></body></html>",
            SerializeOptions::default(),
        );
        assert_eq!(
            out,
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><img src=\"a.png\"><br></body></html>"
        );
    }

    #[test]
    fn test_xhtml_doctype_ids() {
        let out = roundtrip(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\"><html></html>",
            SerializeOptions::default(),
        );
        assert!(out.starts_with(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">"
        ));
    }

    #[test]
    fn test_template_syntax_survives() {
        let out = roundtrip(
            "<html><body><p>Hi {{ $user->name }} &amp; @if($x > 1) ok @endif</p><a href=\"{{ url('/a?b=1&c=2') }}\">x</a></body></html>",
            SerializeOptions::default(),
        );
        assert!(out.contains("<p>Hi {{ $user->name }} & @if($x > 1) ok @endif</p>"));
        assert!(out.contains("href=\"{{ url('/a?b=1&c=2') }}\""));
    }

    #[test]
    fn test_escapes_what_would_reparse() {
        let out = roundtrip(
            "<html><body><p>&amp;copy; &lt;b&gt; &nbsp;</p></body></html>",
            SerializeOptions::default(),
        );
        assert!(out.contains("<p>&amp;copy; &lt;b> &nbsp;</p>"));
    }

    #[test]
    fn test_collapse_whitespace() {
        let out = roundtrip(
            "<html>\n<body>\n  <table>\n    <tr>\n      <td>  Hello   <b>big</b>   world  </td>\n    </tr>\n  </table>\n</body>\n</html>",
            SerializeOptions {
                collapse_whitespace: true,
                minify_css: false,
            },
        );
        assert!(out.contains("<table><tbody><tr><td>Hello <b>big</b> world</td></tr></tbody></table>"));
    }

    #[test]
    fn test_pre_keeps_whitespace() {
        let out = roundtrip(
            "<html><body><pre>  a\n   b</pre></body></html>",
            SerializeOptions {
                collapse_whitespace: true,
                minify_css: false,
            },
        );
        assert!(out.contains("<pre>  a\n   b</pre>"));
    }

    #[test]
    fn test_minifies_style_blocks_and_attributes() {
        let out = roundtrip(
            "<html><head><style>\n.a {\n  color: red;\n}\n</style></head><body><p style=\"color: blue;  margin: 0px\">x</p></body></html>",
            SerializeOptions {
                collapse_whitespace: true,
                minify_css: true,
            },
        );
        assert!(out.contains("<style>.a{color:red}</style>"));
        assert!(out.contains("style=\"color:#00f;margin:0\""));
    }

    #[test]
    fn test_rewrites() {
        let doc = Html::parse_document(
            "<html><head><link rel=\"stylesheet\" href=\"css/app.css\"></head><body><p>x</p></body></html>",
        );
        let link = doc
            .select(&scraper::Selector::parse("link").unwrap())
            .next()
            .unwrap()
            .id();
        let p = doc
            .select(&scraper::Selector::parse("p").unwrap())
            .next()
            .unwrap()
            .id();

        let mut rewrites = Rewrites::default();
        rewrites.removed.insert(link);
        rewrites.styles.insert(p, "color:red".into());

        let out = serialize(&doc, &rewrites, SerializeOptions::default());
        assert!(!out.contains("<link"));
        assert!(out.contains("<p style=\"color:red\">x</p>"));
    }

    #[test]
    fn test_comments_are_kept() {
        let out = roundtrip(
            "<html><head><!-- <style> --></head><body></body></html>",
            SerializeOptions::default(),
        );
        assert!(out.contains("<!-- <style> -->"));
    }
}
