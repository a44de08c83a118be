//! Font copying. Only the web formats move to dist; desktop formats that
//! sometimes live next to them (ttf, otf) stay behind.

use std::fs;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

const WEB_FONTS: &[&str] = &["woff", "woff2"];

/// Copy every web font at the top level of `src` into `dst`.
///
/// Returns the copied file names.
pub fn copy_fonts(src: &Utf8Path, dst: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut copied = Vec::new();

    if !src.exists() {
        return Ok(copied);
    }

    fs::create_dir_all(dst)?;

    for entry in src.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();

        let is_font = path
            .extension()
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| WEB_FONTS.contains(&ext.as_str()));

        if entry.file_type()?.is_file() && is_font {
            let target = dst.join(path.file_name().expect("files have names"));
            fs::copy(path, &target).with_context(|| format!("copying {path}"))?;
            copied.push(target);
        }
    }

    copied.sort();
    Ok(copied)
}
