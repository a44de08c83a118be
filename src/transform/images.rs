//! Lossless image optimization.
//!
//! Only formats with a lossless re-encode path are touched; everything else
//! is copied through unmodified so the dist tree never silently loses files.
//! If the re-encoded image comes out larger than the original, the original
//! bytes win.

use std::fs;

use anyhow::Context;
use camino::Utf8Path;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

/// Optimize `src` into `dst`, creating parent directories as needed.
pub fn optimize_into(src: &Utf8Path, dst: &Utf8Path) -> anyhow::Result<()> {
    if let Some(dir) = dst.parent() {
        fs::create_dir_all(dir)?;
    }

    let extension = src
        .extension()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "png" => {
            let original = fs::read(src).with_context(|| format!("reading {src}"))?;
            let encoded = reencode_png(&original).with_context(|| format!("optimizing {src}"))?;

            let bytes = if encoded.len() < original.len() {
                &encoded
            } else {
                &original
            };
            fs::write(dst, bytes).with_context(|| format!("writing {dst}"))?;
        }
        // Pass-through: no lossless encoder available for this extension.
        _ => {
            fs::copy(src, dst).with_context(|| format!("copying {src} to {dst}"))?;
        }
    }

    Ok(())
}

fn reencode_png(original: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(original)?;

    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn unsupported_extensions_pass_through_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let src = root.join("photo.jpg");
        let dst = root.join("out/photo.jpg");
        fs::write(&src, b"not really a jpeg").unwrap();

        optimize_into(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"not really a jpeg");
    }

    #[test]
    fn png_roundtrip_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let src = root.join("dot.png");
        let dst = root.join("out/dot.png");

        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]));
        img.save(&src).unwrap();

        optimize_into(&src, &dst).unwrap();

        let out = image::open(&dst).unwrap().to_rgba8();
        assert_eq!(out.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
    }
}
