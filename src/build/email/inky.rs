//! Inky email markup normalizer.
//!
//! Expands the shorthand components (`<container>`, `<row>`, `<columns>`,
//! `<button>`, ...) into the nested tables email clients understand. Everything
//! that is not a component tag passes through untouched, including template
//! syntax of the host framework.

use std::sync::LazyLock;

use regex::Regex;

const COMPONENTS: &str =
    "container|row|columns|button|spacer|wrapper|callout|center|h-line|menu|item|block-grid";

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<(/?)({COMPONENTS})(\s[^>]*?)?\s*(/?)>"))
        .expect("valid regex")
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s=/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("valid regex")
});

const GRID_COLUMNS: u32 = 12;

// =============================================================================
// Component tree
// =============================================================================

#[derive(Debug)]
enum Node {
    Text(String),
    Component(Component),
}

#[derive(Debug, Default)]
struct Component {
    name: String,
    attrs: Vec<(String, Option<String>)>,
    children: Vec<Node>,
}

impl Component {
    fn new(name: &str, attrs: &str) -> Self {
        let attrs = ATTR
            .captures_iter(attrs)
            .map(|c| {
                let value = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4));
                (c[1].to_string(), value.map(|v| v.as_str().to_string()))
            })
            .collect();
        Self {
            name: name.to_ascii_lowercase(),
            attrs,
            children: Vec::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    fn has_flag(&self, name: &str) -> bool {
        self.attr(name).is_some_and(|v| v != "false")
    }

    /// `class="..."` merging the component's own classes with the author's.
    fn class(&self, base: &str) -> String {
        match self.attr("class").map(str::trim).filter(|c| !c.is_empty()) {
            Some(extra) if base.is_empty() => format!(r#"class="{extra}""#),
            Some(extra) => format!(r#"class="{base} {extra}""#),
            None => format!(r#"class="{base}""#),
        }
    }

    /// Remaining attributes, rendered with a leading space each.
    fn rest(&self, consumed: &[&str]) -> String {
        let mut out = String::new();
        for (key, value) in &self.attrs {
            if key.eq_ignore_ascii_case("class")
                || consumed.iter().any(|c| key.eq_ignore_ascii_case(c))
            {
                continue;
            }
            match value {
                Some(v) => out.push_str(&format!(r#" {key}="{v}""#)),
                None => out.push_str(&format!(" {key}")),
            }
        }
        out
    }

    fn contains(&self, name: &str) -> bool {
        self.children.iter().any(|child| match child {
            Node::Component(c) => c.name == name || c.contains(name),
            Node::Text(_) => false,
        })
    }
}

fn parse(input: &str) -> Vec<Node> {
    let mut stack = vec![Component::default()];
    let mut last = 0;

    for caps in TAG.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            push_node(&mut stack, Node::Text(input[last..whole.start()].to_string()));
        }
        last = whole.end();

        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();

        if closing {
            // Ignore the root frame at index 0.
            match stack.iter().rposition(|c| c.name == name) {
                Some(pos) if pos > 0 => {
                    while stack.len() > pos {
                        close_top(&mut stack);
                    }
                }
                _ => push_node(&mut stack, Node::Text(whole.as_str().to_string())),
            }
            continue;
        }

        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let component = Component::new(&name, attrs);
        if caps[4].is_empty() {
            stack.push(component);
        } else {
            push_node(&mut stack, Node::Component(component));
        }
    }

    if last < input.len() {
        push_node(&mut stack, Node::Text(input[last..].to_string()));
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn push_node(stack: &mut [Component], node: Node) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

fn close_top(stack: &mut Vec<Component>) {
    if let Some(done) = stack.pop() {
        push_node(stack, Node::Component(done));
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Expand every Inky component in `html`.
pub fn expand(html: &str) -> String {
    let nodes = parse(html);
    let mut out = String::with_capacity(html.len() * 2);
    render_nodes(&nodes, &mut out);
    out
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    let columns: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, Node::Component(c) if c.name == "columns"))
        .map(|(i, _)| i)
        .collect();

    for (index, node) in nodes.iter().enumerate() {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Component(c) if c.name == "columns" => {
                let position = ColumnPosition {
                    first: columns.first() == Some(&index),
                    last: columns.last() == Some(&index),
                    siblings: columns.len() as u32,
                };
                render_column(c, position, out);
            }
            Node::Component(c) => render_component(c, out),
        }
    }
}

fn inner(c: &Component) -> String {
    let mut out = String::new();
    render_nodes(&c.children, &mut out);
    out
}

fn link(c: &Component, body: &str) -> String {
    match c.attr("href") {
        Some(href) => {
            let target = c
                .attr("target")
                .map(|t| format!(r#" target="{t}""#))
                .unwrap_or_default();
            format!(r#"<a href="{href}"{target}>{body}</a>"#)
        }
        None => body.to_string(),
    }
}

fn render_component(c: &Component, out: &mut String) {
    let body = inner(c);
    let html = match c.name.as_str() {
        "container" => format!(
            r#"<table align="center" {}{}><tbody><tr><td>{body}</td></tr></tbody></table>"#,
            c.class("container"),
            c.rest(&["align"]),
        ),
        "row" => format!(
            r#"<table {}{}><tbody><tr>{body}</tr></tbody></table>"#,
            c.class("row"),
            c.rest(&[]),
        ),
        "button" => format!(
            r#"<table {}{}><tbody><tr><td><table><tbody><tr><td>{}</td></tr></tbody></table></td></tr></tbody></table>"#,
            c.class("button"),
            c.rest(&["href", "target"]),
            link(c, &body),
        ),
        "spacer" => {
            let size = c.attr("size").filter(|s| !s.is_empty()).unwrap_or("16");
            format!(
                r#"<table {}{}><tbody><tr><td height="{size}px" style="font-size:{size}px;line-height:{size}px;">&#xA0;</td></tr></tbody></table>"#,
                c.class("spacer"),
                c.rest(&["size"]),
            )
        }
        "wrapper" => format!(
            r#"<table {} align="center"{}><tbody><tr><td class="wrapper-inner">{body}</td></tr></tbody></table>"#,
            c.class("wrapper"),
            c.rest(&["align"]),
        ),
        "callout" => format!(
            r#"<table class="callout"{}><tbody><tr><th {}>{body}</th><th class="expander"></th></tr></tbody></table>"#,
            c.rest(&[]),
            c.class("callout-inner"),
        ),
        "center" => format!(
            r#"<center data-parsed=""{}{}>{body}</center>"#,
            c.attr("class")
                .map(|_| format!(" {}", c.class("")))
                .unwrap_or_default(),
            c.rest(&[]),
        ),
        "h-line" => format!(
            r#"<table {}{}><tbody><tr><th>&nbsp;</th></tr></tbody></table>"#,
            c.class("h-line"),
            c.rest(&[]),
        ),
        "menu" => format!(
            r#"<table {}{}><tbody><tr><td><table><tbody><tr>{body}</tr></tbody></table></td></tr></tbody></table>"#,
            c.class("menu"),
            c.rest(&[]),
        ),
        "item" => format!(
            r#"<th {}{}>{}</th>"#,
            c.class("menu-item"),
            c.rest(&["href", "target"]),
            link(c, &body),
        ),
        "block-grid" => {
            let up = c.attr("up").filter(|s| !s.is_empty()).unwrap_or("1");
            format!(
                r#"<table {}{}><tbody><tr>{body}</tr></tbody></table>"#,
                c.class(&format!("block-grid up-{up}")),
                c.rest(&["up"]),
            )
        }
        _ => body,
    };
    out.push_str(&html);
}

#[derive(Debug, Clone, Copy)]
struct ColumnPosition {
    first: bool,
    last: bool,
    siblings: u32,
}

fn render_column(c: &Component, position: ColumnPosition, out: &mut String) {
    let small = c
        .attr("small")
        .filter(|s| !s.is_empty())
        .unwrap_or("12")
        .to_string();
    let large = match c.attr("large").filter(|s| !s.is_empty()) {
        Some(large) => large.to_string(),
        None if c.attr("small").is_some_and(|s| !s.is_empty()) => small.clone(),
        None => (GRID_COLUMNS / position.siblings.max(1)).to_string(),
    };

    let mut classes = format!("small-{small} large-{large} columns");
    if position.first {
        classes.push_str(" first");
    }
    if position.last {
        classes.push_str(" last");
    }

    let expander = large == GRID_COLUMNS.to_string()
        && !c.contains("row")
        && !c.has_flag("no-expander");
    let expander = if expander {
        r#"<th class="expander"></th>"#
    } else {
        ""
    };

    out.push_str(&format!(
        r#"<th {}{}><table><tbody><tr><th>{}</th>{expander}</tr></tbody></table></th>"#,
        c.class(&classes),
        c.rest(&["small", "large", "no-expander"]),
        inner(c),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_html_untouched() {
        let html = "<p>Hello {{ $user->name }}</p>";
        assert_eq!(expand(html), html);
    }

    #[test]
    fn test_container_and_row() {
        let out = expand("<container><row>x</row></container>");
        assert_eq!(
            out,
            r#"<table align="center" class="container"><tbody><tr><td><table class="row"><tbody><tr>x</tr></tbody></table></td></tr></tbody></table>"#
        );
    }

    #[test]
    fn test_columns_first_last_and_sizes() {
        let out = expand(r#"<row><columns small="12" large="6">A</columns><columns>B</columns></row>"#);

        assert!(out.contains(r#"<th class="small-12 large-6 columns first">"#));
        // Defaults: small 12, large split among siblings
        assert!(out.contains(r#"<th class="small-12 large-6 columns last">"#));
        assert!(!out.contains("expander"));
    }

    #[test]
    fn test_single_full_width_column_gets_expander() {
        let out = expand("<row><columns>Only</columns></row>");
        assert!(out.contains(r#"<th class="small-12 large-12 columns first last">"#));
        assert!(out.contains(r#"<th>Only</th><th class="expander"></th>"#));
    }

    #[test]
    fn test_button_with_link_and_class() {
        let out = expand(r#"<button class="radius" href="https://pony.fm">Go</button>"#);
        assert_eq!(
            out,
            r#"<table class="button radius"><tbody><tr><td><table><tbody><tr><td><a href="https://pony.fm">Go</a></td></tr></tbody></table></td></tr></tbody></table>"#
        );
    }

    #[test]
    fn test_spacer_sizes() {
        let out = expand(r#"<spacer size="10"></spacer>"#);
        assert!(out.contains(r#"height="10px" style="font-size:10px;line-height:10px;""#));

        let out = expand("<spacer/>");
        assert!(out.contains(r#"height="16px""#));
    }

    #[test]
    fn test_menu_items() {
        let out = expand(r#"<menu><item href="/a">A</item></menu>"#);
        assert!(out.contains(r#"<th class="menu-item"><a href="/a">A</a></th>"#));
        assert!(out.starts_with(r#"<table class="menu">"#));
    }

    #[test]
    fn test_nested_row_suppresses_expander() {
        let out = expand("<row><columns><row><columns>x</columns></row></columns></row>");
        let outer = out.find("<th class=\"small-12 large-12 columns first last\">").unwrap();
        assert_eq!(outer, out.find("<th class=").unwrap());
        // only the inner column gets an expander
        assert_eq!(out.matches("expander").count(), 1);
    }

    #[test]
    fn test_unmatched_closing_tag_kept() {
        assert_eq!(expand("a</row>b"), "a</row>b");
    }

    #[test]
    fn test_other_attributes_preserved() {
        let out = expand(r##"<wrapper class="header" bgcolor="#8a8a8a">x</wrapper>"##);
        assert!(out.starts_with(r##"<table class="wrapper header" align="center" bgcolor="#8a8a8a">"##));
    }
}
