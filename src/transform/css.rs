//! A small structural model of CSS, shared by the unused-rule purge and the
//! critical-CSS extractor.
//!
//! This is not a conforming CSS parser; it only splits a stylesheet into
//! rules with balanced braces, which is all the selector-retention passes
//! need. Strings and comments are respected so braces inside them never
//! confuse the scanner.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rule {
    /// An ordinary style rule: `selector { body }`.
    Style { selector: String, body: String },
    /// A conditional group whose contents are themselves rules
    /// (`@media`, `@supports`).
    AtBlock { prelude: String, rules: Vec<Rule> },
    /// Any other at-rule with a block (`@font-face`, `@keyframes`), kept
    /// verbatim.
    AtRaw { prelude: String, body: String },
    /// A statement at-rule terminated by a semicolon (`@import`, `@charset`).
    AtStatement(String),
}

pub(crate) fn parse_rules(css: &str) -> Vec<Rule> {
    let bytes = css.as_bytes();
    let mut rules = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        i = skip_trivia(css, i);
        if i >= bytes.len() {
            break;
        }

        let start = i;
        let mut end = None;

        while i < bytes.len() {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_comment(css, i),
                b'"' | b'\'' => i = skip_string(css, i),
                b'{' => {
                    end = Some(b'{');
                    break;
                }
                b';' => {
                    end = Some(b';');
                    break;
                }
                _ => i += 1,
            }
        }

        match end {
            Some(b';') => {
                let text = css[start..i].trim();
                if text.starts_with('@') {
                    rules.push(Rule::AtStatement(text.to_string()));
                }
                i += 1;
            }
            Some(b'{') => {
                let prelude = css[start..i].trim().to_string();
                let close = find_block_end(css, i);
                let inner = &css[i + 1..close];

                if prelude.starts_with("@media") || prelude.starts_with("@supports") {
                    rules.push(Rule::AtBlock {
                        prelude,
                        rules: parse_rules(inner),
                    });
                } else if prelude.starts_with('@') {
                    rules.push(Rule::AtRaw {
                        prelude,
                        body: inner.trim().to_string(),
                    });
                } else {
                    rules.push(Rule::Style {
                        selector: prelude,
                        body: inner.trim().to_string(),
                    });
                }

                i = (close + 1).min(css.len());
            }
            // Trailing garbage without a terminator; nothing usable left.
            _ => break,
        }
    }

    rules
}

pub(crate) fn serialize(rules: &[Rule]) -> String {
    let mut out = String::new();
    write_rules(&mut out, rules);
    out
}

fn write_rules(out: &mut String, rules: &[Rule]) {
    for rule in rules {
        match rule {
            Rule::Style { selector, body } => {
                out.push_str(selector);
                out.push_str(" {\n");
                out.push_str(body);
                out.push_str("\n}\n");
            }
            Rule::AtBlock { prelude, rules } => {
                out.push_str(prelude);
                out.push_str(" {\n");
                write_rules(out, rules);
                out.push_str("}\n");
            }
            Rule::AtRaw { prelude, body } => {
                out.push_str(prelude);
                out.push_str(" {\n");
                out.push_str(body);
                out.push_str("\n}\n");
            }
            Rule::AtStatement(text) => {
                out.push_str(text);
                out.push('\n');
            }
        }
    }
}

fn skip_trivia(css: &str, mut i: usize) -> usize {
    let bytes = css.as_bytes();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            i = skip_comment(css, i);
        } else {
            return i;
        }
    }
}

/// Advance past a `/* ... */` comment starting at `i`.
fn skip_comment(css: &str, i: usize) -> usize {
    match css[i + 2..].find("*/") {
        Some(offset) => i + 2 + offset + 2,
        None => css.len(),
    }
}

/// Advance past a quoted string starting at `i`.
fn skip_string(css: &str, i: usize) -> usize {
    let bytes = css.as_bytes();
    let quote = bytes[i];
    let mut j = i + 1;

    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }

    bytes.len()
}

/// Given `open` pointing at `{`, return the index of the matching `}`, or
/// `css.len()` when the block never closes (the rest is the block body).
fn find_block_end(css: &str, open: usize) -> usize {
    let bytes = css.as_bytes();
    let mut depth = 0;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(css, i);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(css, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }

    css.len()
}

// ******************************
// *    Selector retention      *
// ******************************

static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)").unwrap());
static RE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class\s*=\s*["']([^"']*)["']"#).unwrap());
static RE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id\s*=\s*["']([^"']*)["']"#).unwrap());

/// Names found in a set of HTML documents, used to decide whether a selector
/// can possibly match anything.
#[derive(Debug, Default)]
pub(crate) struct DocIndex {
    tags: HashSet<String>,
    classes: HashSet<String>,
    ids: HashSet<String>,
}

impl DocIndex {
    pub(crate) fn scan_all<'a>(documents: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for html in documents {
            index.scan(html);
        }
        index
    }

    fn scan(&mut self, html: &str) {
        for cap in RE_TAG.captures_iter(html) {
            self.tags.insert(cap[1].to_lowercase());
        }
        for cap in RE_CLASS.captures_iter(html) {
            for class in cap[1].split_whitespace() {
                self.classes.insert(class.to_string());
            }
        }
        for cap in RE_ID.captures_iter(html) {
            self.ids.insert(cap[1].trim().to_string());
        }
    }
}

/// Whether `selector` could match anything in the indexed documents.
///
/// A selector list is used if any alternative is used; an alternative is
/// used if every compound in it is satisfied by the index. Pseudo-classes
/// and attribute selectors are assumed satisfiable, which errs on the side
/// of keeping rules.
pub(crate) fn selector_used(selector: &str, index: &DocIndex) -> bool {
    selector.split(',').any(|alternative| {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            return false;
        }

        alternative
            .split(|c: char| c.is_whitespace() || matches!(c, '>' | '+' | '~'))
            .filter(|compound| !compound.is_empty())
            .all(|compound| compound_satisfied(compound, index))
    })
}

fn compound_satisfied(compound: &str, index: &DocIndex) -> bool {
    let bytes = compound.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'.' | b'#' => {
                let kind = bytes[i];
                let start = i + 1;
                i = start;
                while i < bytes.len() && !matches!(bytes[i], b'.' | b'#' | b':' | b'[') {
                    i += 1;
                }
                let name = &compound[start..i];
                let found = match kind {
                    b'.' => index.classes.contains(name),
                    _ => index.ids.contains(name),
                };
                if !found {
                    return false;
                }
            }
            b'[' => {
                // Attribute selectors are assumed satisfiable.
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
            }
            b':' => {
                // Pseudo-classes never constrain retention; skip the rest of
                // the compound, including any functional arguments.
                let mut depth = 0;
                while i < bytes.len() {
                    match bytes[i] {
                        b'(' => depth += 1,
                        b')' => depth -= 1,
                        b'.' | b'#' | b'[' if depth == 0 => break,
                        _ => {}
                    }
                    i += 1;
                }
            }
            b'*' | b'&' => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && !matches!(bytes[i], b'.' | b'#' | b':' | b'[') {
                    i += 1;
                }
                let tag = compound[start..i].to_lowercase();
                if !tag.is_empty() && tag != "html" && tag != "body" && !index.tags.contains(&tag) {
                    return false;
                }
            }
        }
    }

    true
}
