//! Stylesheet inspection for the email post-processor.
//!
//! Parsing is done by `lightningcss`; this module only flattens what the
//! inliner needs out of the parsed rules.

use lightningcss::declaration::DeclarationBlock;
use lightningcss::rules::CssRule;
use lightningcss::selector::Selector;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;

/// A single `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn to_css(&self) -> String {
        if self.important {
            format!("{}:{} !important", self.property, self.value)
        } else {
            format!("{}:{}", self.property, self.value)
        }
    }
}

/// One selector of a style rule, printed back to CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSelector {
    pub text: String,
    /// Packed specificity; compares like the `(a, b, c)` triple.
    pub specificity: u32,
}

/// A top-level style rule.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selectors: Vec<RuleSelector>,
    pub declarations: Vec<Declaration>,
}

pub fn parse(css: &str) -> Result<StyleSheet<'_>, String> {
    StyleSheet::parse(css, ParserOptions::default()).map_err(|e| e.to_string())
}

pub fn selector_text(selector: &Selector<'_>) -> String {
    selector
        .to_css_string(PrinterOptions::default())
        .unwrap_or_default()
}

fn declarations(block: &DeclarationBlock<'_>) -> Vec<Declaration> {
    let normal = block.declarations.iter().map(|p| (p, false));
    let important = block.important_declarations.iter().map(|p| (p, true));
    normal
        .chain(important)
        .filter_map(|(property, important)| {
            let value = property
                .value_to_css_string(PrinterOptions::default())
                .ok()?;
            Some(Declaration {
                property: property.property_id().name().to_string(),
                value,
                important,
            })
        })
        .collect()
}

/// Top-level style rules in source order. Rules nested in at-rules are skipped.
pub fn style_rules(css: &str) -> Result<Vec<StyleRule>, String> {
    let sheet = parse(css)?;
    Ok(sheet
        .rules
        .0
        .iter()
        .filter_map(|rule| match rule {
            CssRule::Style(style) => Some(StyleRule {
                selectors: style
                    .selectors
                    .0
                    .iter()
                    .map(|s| RuleSelector {
                        text: selector_text(s),
                        specificity: s.specificity(),
                    })
                    .collect(),
                declarations: declarations(&style.declarations),
            }),
            _ => None,
        })
        .collect())
}

/// The `@media` blocks of a stylesheet, concatenated.
pub fn media_queries(css: &str) -> Result<String, String> {
    let sheet = parse(css)?;
    let mut out = String::new();
    for rule in &sheet.rules.0 {
        if matches!(rule, CssRule::Media(_)) {
            out.push_str(
                &rule
                    .to_css_string(PrinterOptions::default())
                    .map_err(|e| e.to_string())?,
            );
        }
    }
    Ok(out)
}

/// Declarations of a `style` attribute, or `None` when it does not parse.
pub fn inline_declarations(style: &str) -> Option<Vec<Declaration>> {
    let attribute = StyleAttribute::parse(style, ParserOptions::default()).ok()?;
    Some(declarations(&attribute.declarations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specificity_of(css: &str) -> u32 {
        style_rules(css).unwrap()[0].selectors[0].specificity
    }

    #[test]
    fn test_style_rules_and_declarations() {
        let rules = style_rules(
            "/* x */ td, .title { color: red; padding: 1px } @media (max-width: 10px) { p { margin: 0 } } a { color: blue !important }",
        )
        .unwrap();

        assert_eq!(rules.len(), 2);
        let texts: Vec<&str> = rules[0].selectors.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["td", ".title"]);
        assert_eq!(rules[0].declarations[0].to_css(), "color:red");
        assert_eq!(rules[0].declarations[1].to_css(), "padding:1px");
        assert!(rules[1].declarations[0].important);
    }

    #[test]
    fn test_specificity_ordering() {
        let id = specificity_of("#hero {}");
        let class = specificity_of(".title {}");
        let element = specificity_of("td {}");
        let compound = specificity_of("td.title {}");

        assert!(id > compound);
        assert!(compound > class);
        assert!(class > element);
    }

    #[test]
    fn test_negation_list_uses_most_specific_argument() {
        assert_eq!(
            specificity_of("td:not(.x, .y) {}"),
            specificity_of("td.title {}")
        );
    }

    #[test]
    fn test_media_queries_only() {
        let media = media_queries(".a { color: red } @media print { .a { color: blue } }").unwrap();
        assert!(media.starts_with("@media print"));
        assert!(!media.contains("red"));
    }

    #[test]
    fn test_inline_declarations() {
        let declarations = inline_declarations("color: green; width: 10px").unwrap();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].property, "color");
    }
}
