//! Immutable path configuration.
//!
//! The pipeline never consults ambient globals for file locations; a
//! [`Paths`] value is constructed once at startup and passed explicitly to
//! every component that touches the filesystem.

use camino::{Utf8Path, Utf8PathBuf};

/// Logical asset categories. Every task selects its inputs and writes its
/// outputs through one of these, never through a raw directory string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Styles,
    Images,
    Scripts,
    Pages,
    Fonts,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Styles,
        Category::Images,
        Category::Scripts,
        Category::Pages,
        Category::Fonts,
    ];
}

/// One root directory per asset category. Two instances exist per pipeline:
/// one rooted in the source tree, one in the dist tree, and both resolve
/// every category (tasks may reference any category on either side).
#[derive(Debug, Clone)]
pub struct PathSet {
    root: Utf8PathBuf,
    styles: Utf8PathBuf,
    images: Utf8PathBuf,
    scripts: Utf8PathBuf,
    pages: Utf8PathBuf,
    fonts: Utf8PathBuf,
}

impl PathSet {
    pub fn dir(&self, category: Category) -> &Utf8Path {
        match category {
            Category::Styles => &self.styles,
            Category::Images => &self.images,
            Category::Scripts => &self.scripts,
            Category::Pages => &self.pages,
            Category::Fonts => &self.fonts,
        }
    }

    /// The root of this tree, above every category directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

/// The full path configuration: a source tree and a mirrored dist tree.
#[derive(Debug, Clone)]
pub struct Paths {
    pub source: PathSet,
    pub dist: PathSet,
}

impl Paths {
    /// The conventional layout: `src/assets/{css,img,js,fonts}` with pages
    /// directly under `src`, mirrored under `dist`.
    pub fn conventional(root: impl AsRef<Utf8Path>) -> Self {
        let root = root.as_ref();

        Self {
            source: layout(root.join("src"), root.join("src/assets")),
            dist: layout(root.join("dist"), root.join("dist/assets")),
        }
    }
}

fn layout(pages: Utf8PathBuf, assets: Utf8PathBuf) -> PathSet {
    PathSet {
        root: pages.clone(),
        styles: assets.join("css"),
        images: assets.join("img"),
        scripts: assets.join("js"),
        fonts: assets.join("fonts"),
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_layout_mirrors_categories() {
        let paths = Paths::conventional("site");

        for category in Category::ALL {
            let src = paths.source.dir(category);
            let dst = paths.dist.dir(category);
            assert!(src.starts_with("site/src"), "{src}");
            assert!(dst.starts_with("site/dist"), "{dst}");
        }

        assert_eq!(paths.source.dir(Category::Styles), "site/src/assets/css");
        assert_eq!(paths.dist.dir(Category::Styles), "site/dist/assets/css");
        assert_eq!(paths.source.dir(Category::Pages), "site/src");
        assert_eq!(paths.dist.dir(Category::Pages), "site/dist");
    }
}
