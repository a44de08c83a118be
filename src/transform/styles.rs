//! Style preprocessing and the CSS post-processing chain.
//!
//! Compilation is delegated to `grass`; everything after it is an ordered
//! chain of `css -> css` passes. The chain order is part of the pipeline
//! contract: vendor prefixing and unit conversion must run before the purge,
//! and minification always runs last.

use std::sync::LazyLock;

use anyhow::Context;
use camino::Utf8Path;
use regex::Regex;

use super::css::{self, DocIndex, Rule};

/// One `css -> css` post-processing step.
pub type CssPass = Box<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// Compile a Sass entry point to expanded CSS.
pub fn compile(entry: &Utf8Path) -> anyhow::Result<String> {
    let opts = grass::Options::default();
    grass::from_path(entry, &opts)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("compiling {entry}"))
}

/// Run the passes in their declared order.
pub fn apply(css: &str, passes: &[CssPass]) -> anyhow::Result<String> {
    let mut current = css.to_string();
    for pass in passes {
        current = pass(&current)?;
    }
    Ok(current)
}

/// Properties that still need vendor-prefixed duplicates in the browsers the
/// original pipeline targeted.
const PREFIXED: &[(&str, &[&str])] = &[
    ("user-select", &["-webkit-", "-moz-", "-ms-"]),
    ("appearance", &["-webkit-", "-moz-"]),
    ("backdrop-filter", &["-webkit-"]),
    ("text-size-adjust", &["-webkit-", "-moz-", "-ms-"]),
    ("tab-size", &["-moz-"]),
    ("hyphens", &["-webkit-", "-ms-"]),
    ("clip-path", &["-webkit-"]),
    ("box-decoration-break", &["-webkit-"]),
];

/// Vendor prefixing: insert prefixed copies before each declaration whose
/// property needs them.
pub fn pass_prefix() -> CssPass {
    Box::new(|input| {
        let mut rules = css::parse_rules(input);
        walk_style_bodies(&mut rules, &|body| prefix_body(body));
        Ok(css::serialize(&rules))
    })
}

fn prefix_body(body: &str) -> String {
    let mut out = Vec::new();

    for declaration in split_declarations(body) {
        if let Some((property, value)) = declaration.split_once(':') {
            let property = property.trim();
            if let Some((_, prefixes)) = PREFIXED.iter().find(|(p, _)| *p == property) {
                for prefix in prefixes.iter() {
                    out.push(format!("{prefix}{property}:{value}"));
                }
            }
        }
        out.push(declaration.to_string());
    }

    out.join(";\n")
}

static RE_PX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<num>\d*\.?\d+)px\b").unwrap());

/// Unit conversion: rewrite `px` lengths as `rem` against the given root
/// font size.
pub fn pass_px_to_rem(root: f64) -> CssPass {
    Box::new(move |input| {
        let mut rules = css::parse_rules(input);
        walk_style_bodies(&mut rules, &|body| {
            RE_PX
                .replace_all(body, |caps: &regex::Captures| {
                    let px: f64 = caps["num"].parse().expect("regex matched a number");
                    format_rem(px / root)
                })
                .into_owned()
        });
        Ok(css::serialize(&rules))
    })
}

fn format_rem(value: f64) -> String {
    let text = format!("{value:.5}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0rem".to_string()
    } else {
        format!("{text}rem")
    }
}

/// Unused-rule purge: drop every style rule whose selector cannot match the
/// given HTML documents. Selectors matching any of the `keep` patterns are
/// always retained, as are at-rules other than conditional groups.
pub fn pass_purge(documents: Vec<String>, keep: Vec<Regex>) -> CssPass {
    Box::new(move |input| {
        let index = DocIndex::scan_all(documents.iter().map(String::as_str));
        let mut rules = css::parse_rules(input);
        purge_rules(&mut rules, &index, &keep);
        Ok(css::serialize(&rules))
    })
}

fn purge_rules(rules: &mut Vec<Rule>, index: &DocIndex, keep: &[Regex]) {
    rules.retain_mut(|rule| match rule {
        Rule::Style { selector, .. } => {
            keep.iter().any(|re| re.is_match(selector)) || css::selector_used(selector, index)
        }
        Rule::AtBlock { rules, .. } => {
            purge_rules(rules, index, keep);
            !rules.is_empty()
        }
        Rule::AtRaw { .. } | Rule::AtStatement(_) => true,
    });
}

/// The purge ignore list the original pipeline shipped with (Bootstrap
/// classes toggled from JavaScript).
pub fn default_purge_keep() -> Vec<Regex> {
    [
        r"\.js-",
        r"\.hide-input-content",
        r"^\.input",
        r"^\.uncss-",
        r"\.fade",
        r"\.modal",
        r"\.affix",
        r"\.tooltip",
        r"\.popover",
        r"\.collaps",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
}

/// Minification: strip comments and collapse whitespace. Runs on raw text,
/// so it works on any CSS regardless of how earlier passes shaped it.
pub fn pass_minify() -> CssPass {
    Box::new(|input| Ok(minify(input)))
}

fn minify(css: &str) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match css[i + 2..].find("*/") {
                    Some(offset) => i + 2 + offset + 2,
                    None => bytes.len(),
                };
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&css[start..i]);
            }
            b if b.is_ascii_whitespace() => {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                // A single space survives only between two word characters.
                let prev = out.as_bytes().last().copied();
                let next = bytes.get(i);
                if let (Some(p), Some(&n)) = (prev, next) {
                    let boundary = |c: u8| matches!(c, b'{' | b'}' | b';' | b':' | b',' | b'>');
                    if !boundary(p) && !boundary(n) {
                        out.push(' ');
                    }
                }
            }
            b';' => {
                // Drop the final semicolon of a block.
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if bytes.get(j) != Some(&b'}') {
                    out.push(';');
                }
                i += 1;
            }
            _ => {
                // Copy the whole character; the input may be non-ASCII.
                let ch = css[i..].chars().next().expect("index is a char boundary");
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    out.trim().to_string()
}

fn walk_style_bodies(rules: &mut [Rule], f: &dyn Fn(&str) -> String) {
    for rule in rules {
        match rule {
            Rule::Style { body, .. } => *body = f(body),
            Rule::AtBlock { rules, .. } => walk_style_bodies(rules, f),
            _ => {}
        }
    }
}

fn split_declarations(body: &str) -> impl Iterator<Item = &str> {
    body.split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
}
