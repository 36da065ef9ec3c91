//! CSS inlining for HTML email.
//!
//! Rules from the compiled email stylesheet are resolved per element with the
//! usual cascade (importance, then specificity, then source order) and written
//! into `style` attributes. Media queries cannot be inlined, so they are kept
//! in a `<style>` block that replaces the placeholder comment.

use scraper::{Html, Selector};
use tracing::debug;

use super::css::{self, Declaration};
use super::html::{self, Rewrites, SerializeOptions};
use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

/// Pseudo-classes and pseudo-elements that only exist at render time.
const DYNAMIC_PSEUDOS: &[&str] = &[
    "hover",
    "active",
    "focus",
    "focus-within",
    "focus-visible",
    "visited",
    "link",
    "target",
    "before",
    "after",
    "first-line",
    "first-letter",
    "selection",
    "placeholder",
];

/// True if the selector depends on user interaction or generated content.
pub fn is_dynamic(selector: &str) -> bool {
    if selector.contains("::") {
        return true;
    }
    let lower = selector.to_ascii_lowercase();
    lower.split(':').skip(1).any(|rest| {
        let ident: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        DYNAMIC_PSEUDOS.contains(&ident.as_str())
    })
}

struct InlineRule {
    selector: Selector,
    specificity: u32,
    order: usize,
    declarations: Vec<Declaration>,
}

struct Candidate<'a> {
    important: bool,
    specificity: u32,
    order: usize,
    declaration: &'a Declaration,
}

/// Inlines one stylesheet into HTML documents.
pub struct EmailInliner {
    rules: Vec<InlineRule>,
    media: String,
    placeholder: String,
    stylesheet_href: String,
}

impl EmailInliner {
    /// Fails when the stylesheet does not parse.
    pub fn new(
        stylesheet: &str,
        placeholder: impl Into<String>,
        stylesheet_href: impl Into<String>,
    ) -> Result<Self, String> {
        let mut rules = Vec::new();
        for (order, rule) in css::style_rules(stylesheet)?.into_iter().enumerate() {
            if rule.declarations.is_empty() {
                continue;
            }
            for selector in rule.selectors {
                if is_dynamic(&selector.text) {
                    continue;
                }
                match Selector::parse(&selector.text) {
                    Ok(parsed) => rules.push(InlineRule {
                        selector: parsed,
                        specificity: selector.specificity,
                        order,
                        declarations: rule.declarations.clone(),
                    }),
                    Err(e) => debug!(selector = %selector.text, "skipping selector: {e}"),
                }
            }
        }

        let media = css::media_queries(stylesheet)?;
        Ok(Self {
            rules,
            media: if media.is_empty() {
                media
            } else {
                html::minify_stylesheet(&media)
            },
            placeholder: placeholder.into(),
            stylesheet_href: stylesheet_href.into(),
        })
    }

    /// Inline styles into one document and minify it.
    pub fn process(&self, source: &str) -> String {
        let doc = Html::parse_document(source);
        let mut rewrites = Rewrites::default();

        let mut matched: Vec<(ego_tree::NodeId, Vec<Candidate<'_>>)> = Vec::new();
        for rule in &self.rules {
            for element in doc.select(&rule.selector) {
                let candidates = rule.declarations.iter().map(|declaration| Candidate {
                    important: declaration.important,
                    specificity: rule.specificity,
                    order: rule.order,
                    declaration,
                });
                match matched.iter_mut().find(|(id, _)| *id == element.id()) {
                    Some((_, list)) => list.extend(candidates),
                    None => matched.push((element.id(), candidates.collect())),
                }
            }
        }

        for (id, candidates) in matched {
            let existing = doc
                .tree
                .get(id)
                .and_then(|node| node.value().as_element())
                .and_then(|el| el.attr("style"))
                .unwrap_or_default();
            rewrites.styles.insert(id, cascade(candidates, existing));
        }

        if let Ok(style) = Selector::parse("style") {
            for element in doc.select(&style) {
                let text: String = element.text().collect();
                match css::media_queries(&text) {
                    Ok(media) if media.is_empty() => {
                        rewrites.removed.insert(element.id());
                    }
                    Ok(media) => {
                        rewrites.style_text.insert(element.id(), media);
                    }
                    // Leave blocks we cannot parse as they are
                    Err(e) => debug!("keeping unparsable style block: {e}"),
                }
            }
        }

        if let Ok(link) = Selector::parse("link[rel~=\"stylesheet\"]") {
            for element in doc.select(&link) {
                if element.value().attr("href") == Some(self.stylesheet_href.as_str()) {
                    rewrites.removed.insert(element.id());
                }
            }
        }

        let output = html::serialize(
            &doc,
            &rewrites,
            SerializeOptions {
                collapse_whitespace: true,
                minify_css: true,
            },
        );
        output.replacen(&self.placeholder, &format!("<style>{}</style>", self.media), 1)
    }
}

/// Resolve the declarations that apply to one element.
///
/// Declarations already in the element's `style` attribute win over normal
/// rules but lose to `!important` rules unless they are important themselves.
fn cascade(mut candidates: Vec<Candidate<'_>>, inline: &str) -> String {
    candidates.sort_by_key(|c| (c.important, c.specificity, c.order));

    let mut resolved: Vec<(String, Declaration)> = Vec::new();
    for candidate in candidates {
        upsert(&mut resolved, candidate.declaration.clone(), false);
    }
    let mut verbatim = None;
    if !inline.trim().is_empty() {
        match css::inline_declarations(inline) {
            Some(declarations) => {
                for declaration in declarations {
                    upsert(&mut resolved, declaration, true);
                }
            }
            None => verbatim = Some(inline.trim().trim_end_matches(';')),
        }
    }

    let mut parts: Vec<String> = resolved.iter().map(|(_, d)| d.to_css()).collect();
    parts.extend(verbatim.map(str::to_string));
    parts.join(";")
}

fn upsert(resolved: &mut Vec<(String, Declaration)>, declaration: Declaration, inline: bool) {
    let key = declaration.property.to_ascii_lowercase();
    match resolved.iter_mut().find(|(k, _)| *k == key) {
        Some((_, slot)) if inline && slot.important && !declaration.important => {}
        Some((_, slot)) => *slot = declaration,
        None => resolved.push((key, declaration)),
    }
}

impl FileStage for EmailInliner {
    fn name(&self) -> &'static str {
        "inline-css"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let output = self.process(file.text()?);
        file.set_text(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!DOCTYPE html>
<html>
<head>
  <link rel="stylesheet" href="css/app.css">
  <!-- <style> -->
</head>
<body>
  <table class="body"><tr><td class="title" id="hero" style="color: green">Hello {{ $name }}</td></tr></table>
  <a class="button" href="#">Go</a>
</body>
</html>"##;

    fn inliner(css: &str) -> EmailInliner {
        EmailInliner::new(css, "<!-- <style> -->", "css/app.css").unwrap()
    }

    #[test]
    fn test_dynamic_selectors() {
        assert!(is_dynamic("a:hover"));
        assert!(is_dynamic("p::first-line"));
        assert!(is_dynamic(".x:FOCUS"));
        assert!(!is_dynamic("li:first-child"));
        assert!(!is_dynamic("td.title"));
    }

    #[test]
    fn test_inlines_rules_and_removes_link() {
        let out = inliner("table.body { width: 100%; } a.button { color: red; } a:hover { color: blue; }")
            .process(PAGE);

        assert!(out.contains("<table class=\"body\" style=\"width:100%\">"));
        assert!(out.contains("style=\"color:red\""));
        assert!(!out.contains("color:#00f"));
        assert!(!out.contains("<link"));
        assert!(out.contains("Hello {{ $name }}"));
    }

    #[test]
    fn test_specificity_and_inline_precedence() {
        let out = inliner(
            "td { color: red; padding: 1px; } .title { padding: 2px; } #hero { padding: 3px; } td.title { text-align: left !important; }",
        )
        .process(PAGE);

        // The existing inline color beats the normal `td` rule.
        assert!(out.contains("style=\"color:green;padding:3px;text-align:left!important\""), "{out}");
    }

    #[test]
    fn test_negation_list_does_not_outrank_compound() {
        let out = inliner("td:not(.x, .y) { font-size: 10px; } td.title { font-size: 12px; }")
            .process(PAGE);
        assert!(out.contains("font-size:12px"), "{out}");
        assert!(!out.contains("font-size:10px"), "{out}");
    }

    #[test]
    fn test_important_rule_beats_inline() {
        let out = inliner("td { color: red !important; }").process(PAGE);
        assert!(out.contains("style=\"color:red!important\""), "{out}");
    }

    #[test]
    fn test_media_queries_replace_placeholder() {
        let out = inliner(
            ".title { color: red; } @media only screen and (max-width: 596px) { .title { font-size: 12px !important; } }",
        )
        .process(PAGE);

        assert!(!out.contains("<!-- <style> -->"));
        assert!(out.contains("<style>@media only screen and (max-width:596px){"), "{out}");
        assert!(out.contains("font-size:12px!important}}</style>"), "{out}");
    }

    #[test]
    fn test_existing_style_blocks_keep_media_only() {
        let page = "<html><head><style>.a { color: red; } @media (max-width: 10px) { .a { color: blue; } }</style><style>.b { margin: 0; }</style></head><body><p class=\"a\">x</p></body></html>";
        let out = inliner("").process(page);

        assert!(out.contains("<style>@media (max-width:10px){.a{color:#00f}}</style>"), "{out}");
        assert!(!out.contains(".b{"));
        assert!(out.contains("<p class=\"a\">x</p>"));
    }

    #[test]
    fn test_stage_rewrites_file() {
        let stage = inliner("p { margin: 0; }");
        let ctx = PipelineContext::new("email-inline", crate::build::BuildMode::Production);
        let mut file = FileRecord::new(
            "welcome.blade.php",
            "/e/welcome.blade.php",
            b"<html><body><p>Hi</p></body></html>".to_vec(),
        );
        stage.transform(&mut file, &ctx).unwrap();
        assert_eq!(
            file.text().unwrap(),
            "<html><head></head><body><p style=\"margin:0\">Hi</p></body></html>"
        );
    }
}
