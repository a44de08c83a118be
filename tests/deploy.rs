//! End-to-end tests for the production pipeline against a real site tree.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use esteira::{Paths, Pipeline, PipelineOptions, TaskStatus, executor};

const PAGE: &str = r#"<html>
<head>
<!-- build:css -->
<link rel="stylesheet" href="assets/css/main.css">
<!-- endbuild -->
</head>
<body>
<div class="hero">Welcome</div>
<!-- build:globaljs -->
<script src="assets/js/main.js"></script>
<!-- endbuild -->
</body>
</html>
"#;

const STYLES: &str = r#"$accent: red;
.hero { color: $accent; width: 32px; }
.unused { color: blue; }
"#;

fn scaffold(root: &Utf8Path, styles: &str) {
    let src = root.join("src");
    fs::create_dir_all(src.join("assets/css")).unwrap();
    fs::create_dir_all(src.join("assets/js/vendor")).unwrap();
    fs::create_dir_all(src.join("assets/js/pages")).unwrap();
    fs::create_dir_all(src.join("assets/img")).unwrap();
    fs::create_dir_all(src.join("assets/fonts")).unwrap();

    fs::write(src.join("index.html"), PAGE).unwrap();
    fs::write(src.join("assets/css/main.scss"), styles).unwrap();
    fs::write(
        src.join("assets/js/vendor/lib.js"),
        "// vendor\nfunction lib() { return 1; }\n",
    )
    .unwrap();
    fs::write(
        src.join("assets/js/pages/home.js"),
        "// home page\nlib();\n",
    )
    .unwrap();
    fs::write(src.join("assets/fonts/site.woff2"), b"font-bytes").unwrap();

    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 128, 255, 255]));
    img.save(src.join("assets/img/logo.png").as_std_path())
        .unwrap();
}

fn pipeline(root: &Utf8Path) -> Pipeline {
    let options = PipelineOptions {
        vendor_scripts: vec![Utf8PathBuf::from("vendor/lib.js")],
        ..PipelineOptions::default()
    };
    Pipeline::new(Paths::conventional(root), options)
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

#[test]
fn deploy_produces_a_complete_dist_tree() {
    let (_dir, root) = temp_root();
    scaffold(&root, STYLES);

    let report = pipeline(&root).deploy().unwrap();
    assert!(report.ok(), "{report:?}");

    let dist = root.join("dist");
    assert!(dist.join("index.html").exists());
    assert!(dist.join("assets/css/main.css").exists());
    assert!(dist.join("assets/js/main.min.js").exists());
    assert!(dist.join("assets/js/pages/home.js").exists());
    assert!(dist.join("assets/img/logo.png").exists());
    assert!(dist.join("assets/fonts/site.woff2").exists());
}

#[test]
fn deploy_finalizes_references_before_critical_inlining() {
    let (_dir, root) = temp_root();
    scaffold(&root, STYLES);

    let report = pipeline(&root).deploy().unwrap();
    assert!(report.ok());

    let html = fs::read_to_string(root.join("dist/index.html")).unwrap();

    // References point at the production assets, no placeholders left.
    assert!(html.contains(r#"href="assets/css/main.css""#));
    assert!(html.contains(r#"src="assets/js/main.min.js""#));
    assert!(!html.contains("build:"));

    // Critical CSS was extracted from the final stylesheet and inlined.
    assert!(html.contains("<style>"));
    assert!(html.contains(".hero"));
}

#[test]
fn deploy_purges_rules_unused_by_the_final_html() {
    let (_dir, root) = temp_root();
    scaffold(&root, STYLES);

    let report = pipeline(&root).deploy().unwrap();
    assert!(report.ok());

    let css = fs::read_to_string(root.join("dist/assets/css/main.css")).unwrap();
    assert!(css.contains(".hero"));
    assert!(!css.contains(".unused"));

    // px values were converted against the 16px root.
    assert!(css.contains("2rem"), "{css}");
}

#[test]
fn deploy_twice_is_byte_identical() {
    let (_dir, root) = temp_root();
    scaffold(&root, STYLES);

    let pipeline = pipeline(&root);
    assert!(pipeline.deploy().unwrap().ok());

    let outputs = [
        "index.html",
        "assets/css/main.css",
        "assets/js/main.min.js",
        "assets/js/pages/home.js",
        "assets/img/logo.png",
        "assets/fonts/site.woff2",
    ];

    let first: Vec<Vec<u8>> = outputs
        .iter()
        .map(|p| fs::read(root.join("dist").join(p)).unwrap())
        .collect();

    assert!(pipeline.deploy().unwrap().ok());

    for (path, before) in outputs.iter().zip(&first) {
        let after = fs::read(root.join("dist").join(path)).unwrap();
        assert_eq!(&after, before, "{path} changed between identical deploys");
    }
}

#[test]
fn css_failure_skips_dependents_but_independent_outputs_exist() {
    let (_dir, root) = temp_root();
    scaffold(&root, ".broken { color: ");

    let report = pipeline(&root).deploy().unwrap();
    assert!(!report.ok());

    assert!(matches!(
        report.status("build-css"),
        Some(TaskStatus::Failed(_))
    ));
    assert_eq!(report.status("critical-css"), Some(&TaskStatus::Skipped));
    assert_eq!(report.status("deploy"), Some(&TaskStatus::Skipped));

    // Branches independent of the stylesheet still completed.
    assert_eq!(report.status("build-images"), Some(&TaskStatus::Success));
    assert_eq!(report.status("copy-fonts"), Some(&TaskStatus::Success));
    assert_eq!(report.status("global-scripts"), Some(&TaskStatus::Success));

    let dist = root.join("dist");
    assert!(dist.join("assets/img/logo.png").exists());
    assert!(dist.join("assets/fonts/site.woff2").exists());
    assert!(dist.join("assets/js/main.min.js").exists());
    assert!(!dist.join("assets/css/main.css").exists());

    // The aggregated result is the non-zero exit the CLI surfaces.
    let err = executor::into_result(&report).unwrap_err();
    assert!(err.to_string().contains("build-css"));
}
