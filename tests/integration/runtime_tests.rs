use hostpack::core::interfaces::{BundlerService, ScriptPass};
use hostpack::core::models::{SourceUnit, TargetMode};
use hostpack::infrastructure::{
    AtomicArtifactAssembler, ModuleMarkerStripper, NodeModuleResolver, OxcBundler, ScriptEscaper,
    TemplateDowngradePass, TokioFileSystemService,
};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

// These tests execute generated code with node and pass vacuously when it
// is not installed.

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

/// Stdout of `script` run by node, or `None` when node is missing
fn run_node(script: &str) -> Option<String> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.js");
    std::fs::write(&path, script).unwrap();

    let output = match Command::new("node").arg(&path).output() {
        Ok(output) => output,
        Err(e) => {
            eprintln!("skipping: node is not available ({})", e);
            return None;
        }
    };
    assert!(
        output.status.success(),
        "node failed:\n{}\n--- script ---\n{}",
        String::from_utf8_lossy(&output.stderr),
        script
    );
    Some(String::from_utf8(output.stdout).unwrap())
}

fn browser_passes(code: &str, origin: &Path) -> String {
    let downgraded = TemplateDowngradePass::new().apply(code, origin).unwrap();
    ScriptEscaper::new().apply(&downgraded, origin).unwrap()
}

#[tokio::test]
async fn test_cyclic_browser_bundle_runs_with_live_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "main.js",
        "import { b } from './b';\n\
         import { count, inc } from './counter';\n\
         import * as counter from './counter';\n\
         import greet from './greet';\n\
         import pad from 'pad';\n\
         inc();\n\
         inc();\n\
         console.log(JSON.stringify([b(), count, counter.count, { count }, greet('x'), pad('y')]));\n",
    );
    write(root, "a.js", "import { b } from './b';\nexport const a = () => 'A';\nexport const viaB = () => b();\n");
    write(root, "b.js", "import { a } from './a';\nexport const b = () => a();\n");
    write(root, "counter.js", "export let count = 0;\nexport function inc() { count++; }\n");
    write(root, "greet.js", "export default function greet(name) { return `hi ${name}`; }\n");
    write(root, "node_modules/pad/package.json", r#"{ "name": "pad", "main": "index.js" }"#);
    write(root, "node_modules/pad/index.js", "module.exports = function (s) { return '<' + s + '>'; };\n");

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("main.js"), TargetMode::Browser))
        .await
        .unwrap();
    assert_eq!(bundle.modules.len(), 6);

    let expected = "[\"A\",2,2,{\"count\":2},\"hi x\",\"<y>\"]\n";
    let Some(raw) = run_node(&bundle.code) else { return };
    assert_eq!(raw, expected);

    let processed = browser_passes(&bundle.code, &bundle.entry);
    assert_eq!(run_node(&processed).unwrap(), expected);
}

#[test]
fn test_downgraded_templates_evaluate_identically() {
    let program = r#"var log = [];
function side(v) { log.push(v); return v; }
var i = 0;
var who = { toString() { return 'who'; }, valueOf() { return 42; } };
function id(strings) { return strings; }
var sites = [1, 2].map(function () { return id`same${0}site`; });
var results = [
  `plain`,
  `it's "quoted"`,
  `back\\slash \` tick`,
  `line\nbreak\ttab`,
  `two
lines`,
  `${i++}-${i++}-${i}`,
  `${side('a')}${`inner ${side('b')} ${`deep ${side('c')}`}`}`,
  `${who}`,
  `${null} ${undefined} ${[1, 2]}`,
  `\u{1F600} \uD800 \x41`,
  `$\{not} $ {x}`,
  String.raw`raw\n${1}\u0041`,
  sites[0] === sites[1],
  Object.isFrozen(sites[0]) && Object.isFrozen(sites[0].raw),
  sites[0].raw.join('|'),
];
console.log(JSON.stringify([results, log]));
"#;
    let downgraded = TemplateDowngradePass::new().downgrade(program, Path::new("table.js")).unwrap();
    assert!(downgraded.contains(".concat("));

    let Some(original) = run_node(program) else { return };
    assert_eq!(run_node(&downgraded).unwrap(), original);
    assert!(original.contains("\"0-1-2\""));
    assert!(original.contains("[\"a\",\"b\",\"c\"]"));
}

#[test]
fn test_escaped_script_keeps_its_values() {
    let program = "var r = /a:///c\n;\n\
                   var s = '</script>' + \"https://host/\" + `</SCRIPT ${1}`;\n\
                   var cmp = 2 </script/i.lastIndex;\n\
                   // </script> in a comment\n\
                   console.log(JSON.stringify([r.source, s, cmp]));\n";

    let escaped = browser_passes(program, Path::new("escape.js"));
    assert!(AtomicArtifactAssembler::compose_wrapper(&escaped, "javascript.html").is_ok());

    let Some(original) = run_node(program) else { return };
    assert_eq!(original, "[\"a:\",\"</script>https://host/</SCRIPT 1\",false]\n");
    assert_eq!(run_node(&escaped).unwrap(), original);
}

#[tokio::test]
async fn test_stripped_host_bundle_exposes_callable_globals() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "server/main.ts",
        "import { rows, addRow } from './rows';\n\
         export function apiGet(id: number) { return rows[id]; }\n\
         export function apiPost(row: string) { addRow(row); return rows.length; }\n\
         export default function () { return 'default'; }\n",
    );
    write(
        root,
        "server/rows.ts",
        "export const rows: string[] = [];\nexport function addRow(row: string) { rows.push(row); }\n",
    );

    let bundle = bundler(root)
        .bundle(&SourceUnit::new(root.join("server/main.ts"), TargetMode::HostScript))
        .await
        .unwrap();
    let code = ModuleMarkerStripper::new().apply(&bundle.code, &bundle.entry).unwrap();

    // The host evaluates the file as a classic script in its global scope
    let harness = format!(
        "require('vm').runInThisContext({});\n\
         console.log(JSON.stringify([apiPost('first'), apiGet(0), typeof _default === 'function' && _default()]));\n",
        serde_json::to_string(&code).unwrap()
    );
    let Some(output) = run_node(&harness) else { return };
    assert_eq!(output, "[1,\"first\",\"default\"]\n");
}
