use hostpack::core::interfaces::StyleExtractor;
use hostpack::infrastructure::{LightningCssProcessor, TokioFileSystemService};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

fn processor() -> LightningCssProcessor {
    LightningCssProcessor::new(Arc::new(TokioFileSystemService))
}

const TAILWIND_ENTRY: &str = "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n";

#[tokio::test]
async fn test_only_used_utility_is_emitted() {
    let dir = tempfile::tempdir().unwrap();
    let stylesheet = write(dir.path(), "styles.css", TAILWIND_ENTRY);
    let page = write(dir.path(), "App.tsx", "export const App = () => <h1 className=\"text-2xl\">Hi</h1>;\n");

    let artifact = processor().extract(&stylesheet, &[page]).await.unwrap();

    assert_eq!(artifact.css, ".text-2xl{font-size:1.5rem;line-height:2rem}");
    assert_eq!(artifact.generated_rules, 1);
}

#[tokio::test]
async fn test_variants_and_responsive_order() {
    let dir = tempfile::tempdir().unwrap();
    let stylesheet = write(dir.path(), "styles.css", TAILWIND_ENTRY);
    let page = write(
        dir.path(),
        "index.html",
        "<button class=\"bg-blue-500 hover:bg-blue-600 md:p-4 disabled:opacity-50\">Go</button>",
    );

    let artifact = processor().extract(&stylesheet, &[page]).await.unwrap();
    let css = &artifact.css;

    assert!(css.contains(".bg-blue-500{background-color:#3b82f6}"));
    assert!(css.contains(".hover\\:bg-blue-600:hover{background-color:#2563eb}"));
    assert!(css.contains(".disabled\\:opacity-50:disabled{opacity:.5}"));
    assert!(css.contains("768px"));
    assert!(css.contains(".md\\:p-4{padding:1rem}"));
    assert!(css.find("@media").unwrap() > css.find(".bg-blue-500").unwrap());
}

#[tokio::test]
async fn test_hand_written_rules_follow_usage() {
    let dir = tempfile::tempdir().unwrap();
    let stylesheet = write(
        dir.path(),
        "styles.css",
        "html, body { height: 100%; }\n.card { border-radius: 4px; }\n.card-footer { color: gray; }\n#root { display: block; }\n",
    );
    let component = write(dir.path(), "Card.ts", "el.className = 'card';\n");

    let artifact = processor().extract(&stylesheet, &[component]).await.unwrap();

    assert!(artifact.css.contains("html,body{height:100%}"));
    assert!(artifact.css.contains(".card{border-radius:4px}"));
    assert!(artifact.css.contains("#root{display:block}"));
    assert!(!artifact.css.contains("card-footer"));
    assert_eq!(artifact.generated_rules, 0);
}

#[tokio::test]
async fn test_malformed_stylesheet_fails() {
    let dir = tempfile::tempdir().unwrap();
    let stylesheet = write(dir.path(), "styles.css", ".ok { color: red; }\n..broken { color: blue; }\n");

    let err = processor().extract(&stylesheet, &[]).await.unwrap_err();

    assert_eq!(err.kind(), "StyleBuildError");
    assert!(err.to_string().contains("styles.css"));
}

#[tokio::test]
async fn test_missing_stylesheet_is_style_error() {
    let dir = tempfile::tempdir().unwrap();

    let err = processor()
        .extract(&dir.path().join("nope.css"), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "StyleBuildError");
}
