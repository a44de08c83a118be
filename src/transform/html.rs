//! HTML reference rewriting.
//!
//! Source pages reference assets through named build blocks:
//!
//! ```html
//! <!-- build:css -->
//! <link rel="stylesheet" href="assets/css/main.dev.css">
//! <!-- endbuild -->
//! ```
//!
//! Rewriting replaces the whole block with a tag pointing at the final
//! asset path for that name. Blocks with no mapping are left untouched so a
//! page never loses a reference silently.

use std::sync::LazyLock;

use regex::Regex;

static RE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*build:(?P<name>[\w-]+)\s*-->.*?<!--\s*endbuild\s*-->")
        .expect("static pattern compiles")
});

/// Replace every `build:NAME` block with the final reference from `mapping`.
pub fn rewrite_blocks(html: &str, mapping: &[(&str, &str)]) -> String {
    RE_BLOCK
        .replace_all(html, |caps: &regex::Captures| {
            let name = &caps["name"];
            match mapping.iter().find(|(block, _)| *block == name) {
                Some((_, path)) => reference_tag(path),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn reference_tag(path: &str) -> String {
    if path.ends_with(".css") {
        format!(r#"<link rel="stylesheet" href="{path}">"#)
    } else {
        format!(r#"<script src="{path}"></script>"#)
    }
}

/// Whether any unresolved build block remains in the document.
pub fn has_placeholders(html: &str) -> bool {
    RE_BLOCK.is_match(html)
}

/// Inline a block of critical CSS right before `</head>`; documents without
/// a head get the style element prepended instead.
pub fn inline_critical(html: &str, css: &str) -> String {
    let style = format!("<style>{css}</style>");

    match html.find("</head>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + style.len());
            out.push_str(&html[..at]);
            out.push_str(&style);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{style}{html}"),
    }
}
