use hostpack::core::interfaces::{BundlerService, ScriptPass};
use hostpack::core::models::{SourceUnit, TargetMode};
use hostpack::infrastructure::{ModuleMarkerStripper, NodeModuleResolver, OxcBundler, TokioFileSystemService};
use std::path::Path;
use std::sync::Arc;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn bundler(root: &Path) -> OxcBundler {
    OxcBundler::new(
        Arc::new(TokioFileSystemService),
        Arc::new(NodeModuleResolver::new()),
        root,
        "production",
    )
}

#[tokio::test]
async fn test_typescript_graph_becomes_one_blob() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "src/ui/main.ts", "import { greet } from './util';\nconst who: string = 'host';\ndocument.title = greet(who);\n");
    write(root, "src/ui/util.ts", "export const greet = (name: string): string => 'Hello ' + name;\n");

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("src/ui/main.ts"), TargetMode::Browser))
        .await
        .unwrap();

    assert_eq!(bundle.modules.len(), 2);
    assert!(bundle.code.contains("// src/ui/main.ts"));
    assert!(bundle.code.contains("// src/ui/util.ts"));
    assert!(bundle.code.contains("NODE_ENV: \"production\""));
    assert!(!bundle.code.contains(": string"));
}

#[tokio::test]
async fn test_node_modules_package_prefers_browser_entry() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.js", "import { format } from 'tiny-format';\nconsole.log(format(1));\n");
    write(
        root,
        "node_modules/tiny-format/package.json",
        r#"{ "name": "tiny-format", "main": "cjs/index.js", "module": "esm/index.js", "browser": "browser/index.js" }"#,
    );
    write(root, "node_modules/tiny-format/cjs/index.js", "exports.format = function (n) { return 'cjs ' + n; };\n");
    write(root, "node_modules/tiny-format/esm/index.js", "export function format(n) { return 'esm ' + n; }\n");
    write(root, "node_modules/tiny-format/browser/index.js", "export function format(n) { return 'browser ' + n; }\n");

    let browser = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::Browser))
        .await
        .unwrap();
    assert!(browser.code.contains("'browser ' + n"));
    assert!(!browser.code.contains("'cjs ' + n"));

    let host = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::HostScript))
        .await
        .unwrap();
    assert!(host.code.contains("'esm ' + n"));
}

#[tokio::test]
async fn test_scoped_package_with_commonjs_default_import() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.js", "import pad from '@acme/pad';\nconsole.log(pad('x'));\n");
    write(root, "node_modules/@acme/pad/package.json", r#"{ "name": "@acme/pad", "main": "lib/pad.js" }"#);
    write(root, "node_modules/@acme/pad/lib/pad.js", "module.exports = function (s) { return ' ' + s; };\n");

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::Browser))
        .await
        .unwrap();

    assert_eq!(bundle.modules.len(), 2);
    assert!(bundle.code.contains("console.log((__hostpack.importDefault(__hostpack_m0))('x'));"));
    assert!(!bundle.code.contains("var pad ="));
    assert!(bundle.code.contains("module.exports = function (s)"));
}

#[tokio::test]
async fn test_import_cycles_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.js", "import { a } from './a';\nconsole.log(a());\n");
    write(root, "a.js", "import { b } from './b';\nexport function a() { return 'a' + b(); }\n");
    write(root, "b.js", "import * as modA from './a';\nexport function b() { return typeof modA; }\n");

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::Browser))
        .await
        .unwrap();

    assert_eq!(bundle.modules.len(), 3);
    assert!(bundle.code.contains("{\"./a\": 1}"));
    assert!(bundle.code.contains("{\"./b\": 2}"));
}

#[tokio::test]
async fn test_syntax_error_names_the_module() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.js", "import './broken';\n");
    write(root, "broken.js", "export const = 1;\n");

    let err = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::Browser))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "BundleError");
    assert!(err.to_string().contains("broken.js"));
}

#[tokio::test]
async fn test_stripped_host_bundle_keeps_exported_names_global() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "server/main.ts",
        "import { rows } from './rows';\nexport function apiGet(id: number) { return rows[id]; }\nexport function apiPost(row: string) { rows.push(row); return rows.length; }\n",
    );
    write(root, "server/rows.ts", "export const rows: string[] = [];\n");

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("server/main.ts"), TargetMode::HostScript))
        .await
        .unwrap();
    let code = ModuleMarkerStripper::new().apply(&bundle.code, &bundle.entry).unwrap();

    assert!(code.contains("function apiGet(id)"));
    assert!(code.contains("function apiPost(row)"));
    assert!(!code.contains("export function"));
    assert!(code.contains("return __hostpack_m0.rows[id];"));
    assert!(!code.contains("var rows ="));
}
