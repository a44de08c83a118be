//! Critical-CSS extraction.
//!
//! Retains the subset of a stylesheet that can affect the initial render of
//! a document and hands it back for inlining. The selector matcher is the
//! same retention heuristic the purge pass uses; rules on the ignore list
//! (`@font-face`, anything referencing `url(`) are never inlined because
//! they would trigger the very network requests inlining exists to avoid.

use super::css::{self, DocIndex, Rule};

/// Viewports the critical subset should cover. The extractor keeps every
/// rule that can match the document regardless of viewport, so dimensions
/// currently only widen which `@media` blocks are considered.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// The original pipeline extracted for a single small-phone viewport.
pub const DEFAULT_VIEWPORTS: &[Viewport] = &[Viewport {
    width: 320,
    height: 480,
}];

/// Extract the critical subset of `css` for `html`.
pub fn extract(html: &str, css: &str, viewports: &[Viewport]) -> String {
    let index = DocIndex::scan_all([html]);
    let rules = css::parse_rules(css);
    let mut kept = Vec::new();

    retain_critical(&rules, &index, viewports, &mut kept);

    css::serialize(&kept)
}

fn retain_critical(
    rules: &[Rule],
    index: &DocIndex,
    viewports: &[Viewport],
    kept: &mut Vec<Rule>,
) {
    for rule in rules {
        match rule {
            Rule::Style { selector, body } => {
                if body.contains("url(") {
                    continue;
                }
                if css::selector_used(selector, index) {
                    kept.push(rule.clone());
                }
            }
            Rule::AtBlock { prelude, rules } => {
                if !media_applies(prelude, viewports) {
                    continue;
                }
                let mut inner = Vec::new();
                retain_critical(rules, index, viewports, &mut inner);
                if !inner.is_empty() {
                    kept.push(Rule::AtBlock {
                        prelude: prelude.clone(),
                        rules: inner,
                    });
                }
            }
            // @font-face and friends stay external.
            Rule::AtRaw { .. } | Rule::AtStatement(_) => {}
        }
    }
}

/// Whether a conditional group can apply at any of the given viewports.
/// Only `min-width`/`max-width` constraints are evaluated; everything else
/// is assumed to apply.
fn media_applies(prelude: &str, viewports: &[Viewport]) -> bool {
    let min = extract_px(prelude, "min-width");
    let max = extract_px(prelude, "max-width");

    viewports.iter().any(|vp| {
        let w = vp.width as f64;
        min.is_none_or(|min| w >= min) && max.is_none_or(|max| w <= max)
    })
}

fn extract_px(prelude: &str, feature: &str) -> Option<f64> {
    let at = prelude.find(feature)?;
    let rest = &prelude[at + feature.len()..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();

    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><head></head><body><div class="hero">x</div></body></html>"#;

    #[test]
    fn keeps_matching_rules_and_drops_the_rest() {
        let css = ".hero { color: red; } .footer { color: blue; }";
        let out = extract(HTML, css, DEFAULT_VIEWPORTS);

        assert!(out.contains(".hero"));
        assert!(!out.contains(".footer"));
    }

    #[test]
    fn ignores_font_face_and_url_rules() {
        let css = "@font-face { font-family: X; src: url(x.woff); }\n\
                   .hero { background: url(big.png); }\n\
                   .hero { color: red; }";
        let out = extract(HTML, css, DEFAULT_VIEWPORTS);

        assert!(!out.contains("@font-face"));
        assert!(!out.contains("url("));
        assert!(out.contains("color: red"));
    }

    #[test]
    fn media_blocks_outside_the_viewport_are_dropped() {
        let css = "@media (min-width: 1200px) { .hero { display: flex; } }\n\
                   @media (max-width: 600px) { .hero { display: block; } }";
        let out = extract(HTML, css, DEFAULT_VIEWPORTS);

        assert!(!out.contains("display: flex"));
        assert!(out.contains("display: block"));
    }
}
