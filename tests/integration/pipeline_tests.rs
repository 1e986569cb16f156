use hostpack::cli::CliHandler;
use hostpack::core::interfaces::ScriptPass;
use hostpack::core::models::PipelineStage;
use hostpack::core::services::PipelineService;
use hostpack::infrastructure::{ScriptEscaper, TemplateDowngradePass};
use hostpack::utils::{CliOverrides, HostpackError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// A scratch copy of the sample app, so builds never touch the fixture
fn sample_app() -> (tempfile::TempDir, PathBuf) {
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample-app");
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("app");
    copy_dir(&fixture, &root);
    (dir, root)
}

fn pipeline(root: &Path, overrides: CliOverrides) -> PipelineService {
    let config = CliHandler::load_config(root, None, overrides).unwrap();
    PipelineService::from_config(config)
}

fn read(path: PathBuf) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (e.file_name().to_string_lossy().to_string(), std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

struct RejectingPass;

impl ScriptPass for RejectingPass {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn apply(&self, _code: &str, origin: &Path) -> hostpack::utils::Result<String> {
        Err(HostpackError::transform("reject", origin, "refused"))
    }
}

#[tokio::test]
async fn test_sample_app_builds_the_output_set() {
    let (_dir, root) = sample_app();
    let mut build = pipeline(&root, CliOverrides::default());

    let report = build.run().await.unwrap();
    assert_eq!(build.stage(), PipelineStage::Done);
    assert_eq!(report.output.files.len(), 4);
    assert_eq!(report.browser_modules, 3);
    assert_eq!(report.host_modules, 2);

    let outdir = root.join("dist");
    let mut names: Vec<String> = std::fs::read_dir(&outdir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["appsscript.json", "code.js", "index.html", "javascript.html"]);

    assert_eq!(read(outdir.join("appsscript.json")), read(root.join("appsscript.json")));
}

#[tokio::test]
async fn test_script_wrapper_is_safe_to_embed() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();

    let wrapper = read(root.join("dist/javascript.html"));
    assert!(wrapper.starts_with("<script>\n"));
    assert!(wrapper.ends_with("</script>\n"));
    assert_eq!(wrapper.to_ascii_lowercase().matches("</script").count(), 1);
    assert!(!wrapper.contains('`'));
    assert!(!wrapper.contains("https://example.com"));
    assert!(wrapper.contains("https:\\u002F\\u002Fexample.com/docs"));

    // Both modules are in one self-executing blob
    assert!(wrapper.contains("function greeting(name)"));
    assert!(wrapper.contains("// src/ui/util.ts"));
    assert!(!wrapper.contains("import {"));
}

#[tokio::test]
async fn test_shell_inlines_styles_and_includes_script() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();

    let shell = read(root.join("dist/index.html"));
    assert!(shell.contains("<title>Sample</title>"));
    assert!(shell.contains("<?!= include('javascript'); ?>"));
    assert!(!shell.contains("type=\"module\""));
    assert!(shell.find("<style>").unwrap() < shell.find("</head>").unwrap());

    assert!(shell.contains(".text-2xl{"));
    assert!(shell.contains("body{"));
    assert!(!shell.contains("unused-card"));
    assert!(!shell.contains(".text-xl{"));
}

#[tokio::test]
async fn test_host_script_exposes_globals() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();

    let code = read(root.join("dist/code.js"));
    for name in ["doGet", "include", "apiGet", "apiPost"] {
        assert!(code.contains(&format!("function {}(", name)), "{} missing:\n{}", name, code);
    }
    for line in code.lines() {
        let line = line.trim_start();
        assert!(!line.starts_with("export "), "{}", line);
        assert!(!line.starts_with("import "), "{}", line);
    }
    assert!(code.contains("function listEntries()"));
}

#[tokio::test]
async fn test_failed_bundle_keeps_previous_output() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();
    let previous = read(root.join("dist/code.js"));

    std::fs::write(
        root.join("src/server/main.ts"),
        "import { gone } from './missing';\nexport function apiGet() { return gone; }\n",
    )
    .unwrap();

    let mut build = pipeline(&root, CliOverrides::default());
    let err = build.run().await.unwrap_err();

    assert_eq!(build.stage(), PipelineStage::Failed);
    assert_eq!(err.stage(), Some(PipelineStage::Bundling));
    assert_eq!(err.kind(), "BundleError");
    assert!(err.format_detailed().contains("main.ts"));
    assert_eq!(read(root.join("dist/code.js")), previous);
}

#[tokio::test]
async fn test_failed_browser_pass_leaves_output_untouched() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();
    let outdir = root.join("dist");
    let previous = snapshot(&outdir);

    std::fs::write(root.join("src/server/main.ts"), "export function apiGet() { return 'changed'; }\n").unwrap();

    let mut build = pipeline(&root, CliOverrides::default()).with_browser_pass(Arc::new(RejectingPass));
    let err = build.run().await.unwrap_err();

    assert_eq!(build.stage(), PipelineStage::Failed);
    assert_eq!(err.stage(), Some(PipelineStage::Transforming));
    assert_eq!(err.kind(), "TransformError");
    assert_eq!(snapshot(&outdir), previous);
}

#[tokio::test]
async fn test_invalid_manifest_fails_in_assembling() {
    let (_dir, root) = sample_app();
    std::fs::write(root.join("appsscript.json"), "{ \"timeZone\": ").unwrap();

    let err = pipeline(&root, CliOverrides::default()).run().await.unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::Assembling));
    assert_eq!(err.kind(), "ConfigError");
    assert!(!root.join("dist").exists());
}

#[tokio::test]
async fn test_minified_build_is_smaller_and_still_escaped() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();
    let plain = read(root.join("dist/javascript.html"));

    let overrides = CliOverrides {
        outdir: Some("dist-min".to_string()),
        minify: Some(true),
    };
    pipeline(&root, overrides).run().await.unwrap();
    let minified = read(root.join("dist-min/javascript.html"));

    assert!(minified.len() < plain.len());
    assert_eq!(minified.to_ascii_lowercase().matches("</script").count(), 1);
    assert!(!minified.contains('`'));
}

#[tokio::test]
async fn test_passes_are_idempotent_on_the_built_script() {
    let (_dir, root) = sample_app();
    pipeline(&root, CliOverrides::default()).run().await.unwrap();

    let wrapper = read(root.join("dist/javascript.html"));
    let script = wrapper
        .strip_prefix("<script>\n")
        .and_then(|s| s.strip_suffix("\n</script>\n"))
        .unwrap();
    let origin = Path::new("src/ui/main.ts");

    assert_eq!(ScriptEscaper::new().escape(script, origin), script);
    let downgraded = TemplateDowngradePass::new().apply(script, origin).unwrap();
    assert_eq!(downgraded, script);
}
