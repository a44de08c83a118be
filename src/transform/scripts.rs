//! Script bundling and minification.
//!
//! Bundling is plain ordered concatenation of the declared vendor sources.
//! The minifier is deliberately conservative: it strips comments and
//! indentation but keeps every line break, so automatic semicolon insertion
//! is never disturbed. String, template and regex literals pass through
//! untouched.

use anyhow::Context;
use camino::Utf8PathBuf;

/// Concatenate the given files in their declared order.
pub fn concat(files: &[Utf8PathBuf]) -> anyhow::Result<String> {
    let mut out = String::new();

    for file in files {
        let source =
            std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
        out.push_str(&source);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    Ok(out)
}

/// Strip comments, indentation and blank lines from JavaScript source.
pub fn minify(source: &str) -> String {
    let stripped = strip_comments(source);

    let mut out = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    out
}

fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    // Last significant byte emitted, used to tell a regex literal from a
    // division operator.
    let mut last: Option<u8> = None;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = source[i + 2..].find("*/");
                // Keep the newlines inside a block comment so line structure
                // survives for the minifier.
                let close = match end {
                    Some(offset) => i + 2 + offset + 2,
                    None => bytes.len(),
                };
                for b in &bytes[i..close] {
                    if *b == b'\n' {
                        out.push('\n');
                    }
                }
                i = close;
            }
            quote @ (b'"' | b'\'' | b'`') => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&source[start..i]);
                last = Some(quote);
            }
            b'/' if regex_position(last) => {
                let start = i;
                i += 1;
                let mut in_class = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 1,
                        b'[' => in_class = true,
                        b']' => in_class = false,
                        b'/' if !in_class => break,
                        b'\n' => break,
                        _ => {}
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&source[start..i]);
                last = Some(b'/');
            }
            b => {
                // Copy the whole character; the input may be non-ASCII.
                let ch = source[i..].chars().next().expect("index is a char boundary");
                out.push(ch);
                if !b.is_ascii_whitespace() {
                    last = Some(b);
                }
                i += ch.len_utf8();
            }
        }
    }

    out
}

/// After these bytes a `/` starts a regex literal rather than division.
fn regex_position(last: Option<u8>) -> bool {
    match last {
        None => true,
        Some(b) => matches!(
            b,
            b'(' | b',' | b'=' | b':' | b'[' | b'!' | b'&' | b'|' | b'?' | b'{' | b'}' | b';'
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minify_strips_comments_and_blank_lines() {
        let src = "// header\nvar a = 1;\n\n  /* block\n     comment */\n  var b = 2;\n";
        assert_eq!(minify(src), "var a = 1;\nvar b = 2;\n");
    }

    #[test]
    fn minify_keeps_string_contents() {
        let src = "var url = \"http://example.com\"; // trailing\n";
        assert_eq!(minify(src), "var url = \"http://example.com\";\n");
    }

    #[test]
    fn minify_does_not_eat_regex_literals() {
        let src = "var re = /ab\\/c[/]/g;\nvar x = a / b; // note\n";
        let out = minify(src);
        assert!(out.contains("/ab\\/c[/]/g"), "{out}");
        assert!(out.contains("a / b;"), "{out}");
    }

    #[test]
    fn minify_keeps_multibyte_identifiers_intact() {
        let src = "var promoção = 1; // nota\n";
        assert_eq!(minify(src), "var promoção = 1;\n");
    }

    #[test]
    fn concat_preserves_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = Utf8PathBuf::try_from(dir.path().join("a.js")).unwrap();
        let b = Utf8PathBuf::try_from(dir.path().join("b.js")).unwrap();
        std::fs::write(&a, "first();").unwrap();
        std::fs::write(&b, "second();").unwrap();

        let out = concat(&[b.clone(), a.clone()]).unwrap();
        assert_eq!(out, "second();\nfirst();\n");
    }
}
