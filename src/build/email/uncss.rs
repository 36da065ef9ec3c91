//! Unused CSS removal.
//!
//! Selectors that match nothing in any of the built email documents are
//! dropped before the stylesheet is inlined, which keeps the inlined output
//! small.

use lightningcss::rules::CssRule;
use lightningcss::stylesheet::PrinterOptions;
use scraper::{Html, Selector};
use tracing::debug;

use super::css;
use super::inliner::is_dynamic;
use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

/// Removes selectors that match no element in the given documents.
pub struct RemoveUnused {
    documents: Vec<String>,
}

impl RemoveUnused {
    pub fn new(documents: Vec<String>) -> Self {
        Self { documents }
    }

    /// Filter a stylesheet against the documents. The result is minified.
    pub fn filter(&self, stylesheet: &str) -> Result<String, String> {
        let documents: Vec<Html> = self
            .documents
            .iter()
            .map(|d| Html::parse_document(d))
            .collect();

        let mut sheet = css::parse(stylesheet)?;
        retain_used(&mut sheet.rules.0, &documents);
        let printed = sheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| e.to_string())?;
        Ok(printed.code)
    }
}

/// Drop unused selectors, then style and media rules left empty.
/// Other at-rules are kept.
fn retain_used(rules: &mut Vec<CssRule<'_>>, documents: &[Html]) {
    rules.retain_mut(|rule| match rule {
        CssRule::Style(style) => {
            style
                .selectors
                .0
                .retain(|selector| is_used(&css::selector_text(selector), documents));
            if style.selectors.0.is_empty() {
                debug!("dropping unused rule");
                return false;
            }
            true
        }
        CssRule::Media(media) => {
            retain_used(&mut media.rules.0, documents);
            !media.rules.0.is_empty()
        }
        _ => true,
    });
}

/// Strip state-dependent pseudo parts so the selector can be matched statically.
fn static_form(selector: &str) -> String {
    if !is_dynamic(selector) {
        return selector.to_string();
    }
    let mut out = String::with_capacity(selector.len());
    let mut chars = selector.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }
        let double = selector[i + 1..].starts_with(':');
        let start = if double { i + 2 } else { i + 1 };
        let ident: String = selector[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        if double || is_dynamic(&format!(":{ident}")) {
            let skip = (start - i) + ident.len();
            for _ in 1..skip {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() || trimmed.ends_with([' ', '>', '+', '~']) {
        format!("{trimmed}*")
    } else {
        trimmed.to_string()
    }
}

fn is_used(selector: &str, documents: &[Html]) -> bool {
    match Selector::parse(&static_form(selector)) {
        Ok(parsed) => documents.iter().any(|d| d.select(&parsed).next().is_some()),
        // Keep what we cannot evaluate.
        Err(_) => true,
    }
}

impl FileStage for RemoveUnused {
    fn name(&self) -> &'static str {
        "remove-unused-css"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let filtered = self
            .filter(file.text()?)
            .map_err(|e| PipelineError::syntax(&file.origin, e))?;
        file.set_text(filtered);
        Ok(())
    }
}
