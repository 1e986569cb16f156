use crate::core::models::TargetMode;
use crate::utils::Logger;
use dashmap::DashMap;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Extensions tried for extension-less specifiers, in order
const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "json"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "module", "net", "os", "path", "perf_hooks", "process",
    "querystring", "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util",
    "v8", "vm", "worker_threads", "zlib",
];

/// The subset of package.json the resolver reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub exports: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(serde_json::Map<String, serde_json::Value>),
}

/// Node.js-style module resolution. Shared by both bundles; the package.json
/// cache is concurrent.
pub struct NodeModuleResolver {
    package_cache: DashMap<PathBuf, Option<Arc<PackageJson>>>,
}

impl NodeModuleResolver {
    pub fn new() -> Self {
        Self {
            package_cache: DashMap::new(),
        }
    }

    /// Resolve `specifier` imported from `from_file`. Returns a canonical path.
    /// Bare builtin names go through `node_modules` first, so an installed
    /// polyfill such as `events` or `buffer` wins; `node:` specifiers never resolve.
    pub async fn resolve(&self, specifier: &str, from_file: &Path, mode: TargetMode) -> Option<PathBuf> {
        if specifier.starts_with("node:") {
            return None;
        }

        let resolved = if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
            let base = from_file.parent()?.join(specifier);
            self.resolve_file_or_directory(&base, mode).await
        } else if Path::new(specifier).is_absolute() {
            self.resolve_file_or_directory(Path::new(specifier), mode).await
        } else {
            self.resolve_node_module(specifier, from_file, mode).await
        }?;

        let canonical = tokio::fs::canonicalize(&resolved).await.unwrap_or(resolved);
        Logger::module_resolved(specifier, from_file, &canonical);
        Some(canonical)
    }

    /// Node core modules have no counterpart in either target runtime
    pub fn is_builtin(specifier: &str) -> bool {
        if specifier.starts_with("node:") {
            return true;
        }
        let head = specifier.split('/').next().unwrap_or(specifier);
        NODE_BUILTINS.contains(&head)
    }

    pub fn is_node_module(specifier: &str) -> bool {
        !specifier.starts_with("./")
            && !specifier.starts_with("../")
            && specifier != "."
            && specifier != ".."
            && !Path::new(specifier).is_absolute()
    }

    /// Walk up from the importer looking for `node_modules/<package>`
    async fn resolve_node_module(&self, specifier: &str, from_file: &Path, mode: TargetMode) -> Option<PathBuf> {
        let (pkg_name, subpath) = Self::parse_package_specifier(specifier)?;

        let mut current_dir = from_file.parent();
        while let Some(dir) = current_dir {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if package_dir.is_dir() {
                if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref(), mode).await {
                    return Some(entry);
                }
            }
            current_dir = dir.parent();
        }

        None
    }

    /// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `sub/path`)
    fn parse_package_specifier(specifier: &str) -> Option<(String, Option<String>)> {
        let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
        let name = if specifier.starts_with('@') {
            let scope = parts.next()?;
            let pkg = parts.next()?;
            format!("{}/{}", scope, pkg)
        } else {
            parts.next()?.to_string()
        };

        if name.is_empty() {
            return None;
        }

        let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        Some((name, subpath))
    }

    async fn resolve_package_entry(&self, package_dir: &Path, subpath: Option<&str>, mode: TargetMode) -> Option<PathBuf> {
        let package_json = self.read_package_json(&package_dir.join("package.json")).await;

        // The exports field, when present, is authoritative
        if let Some(exports) = package_json.as_ref().and_then(|p| p.exports.as_ref()) {
            let key = match subpath {
                Some(sub) => format!("./{}", sub),
                None => ".".to_string(),
            };
            let target = Self::resolve_exports(exports, &key, mode)?;
            return self.resolve_as_file(&package_dir.join(target)).await;
        }

        if let Some(sub) = subpath {
            return self.resolve_file_or_directory(&package_dir.join(sub), mode).await;
        }

        if let Some(pkg) = &package_json {
            for field in Self::entry_fields(pkg, mode) {
                if let Some(resolved) = self.resolve_file_or_directory(&package_dir.join(field), mode).await {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(package_dir).await
    }

    /// Entry fields in priority order for the target
    fn entry_fields(pkg: &PackageJson, mode: TargetMode) -> Vec<&str> {
        let mut fields = Vec::new();
        if mode == TargetMode::Browser {
            if let Some(BrowserField::String(browser)) = &pkg.browser {
                fields.push(browser.as_str());
            }
        }
        if let Some(module) = &pkg.module {
            fields.push(module.as_str());
        }
        if let Some(main) = &pkg.main {
            fields.push(main.as_str());
        }
        fields
    }

    fn conditions(mode: TargetMode) -> &'static [&'static str] {
        match mode {
            TargetMode::Browser => &["browser", "import", "module", "default"],
            TargetMode::HostScript => &["import", "module", "require", "default"],
        }
    }

    /// Look up `key` ("." or "./sub") in a package's exports map
    fn resolve_exports(exports: &serde_json::Value, key: &str, mode: TargetMode) -> Option<String> {
        use serde_json::Value;

        let is_subpath_map = match exports {
            Value::Object(map) => map.keys().any(|k| k.starts_with('.')),
            _ => false,
        };

        if !is_subpath_map {
            return if key == "." {
                Self::resolve_conditional(exports, mode, None)
            } else {
                None
            };
        }

        let map = exports.as_object()?;
        if let Some(target) = map.get(key) {
            return Self::resolve_conditional(target, mode, None);
        }

        // Single-star subpath patterns, longest prefix wins
        let mut best: Option<(&str, &Value, String)> = None;
        for (pattern, target) in map {
            let Some((prefix, suffix)) = pattern.split_once('*') else {
                continue;
            };
            if key.len() >= prefix.len() + suffix.len() && key.starts_with(prefix) && key.ends_with(suffix) {
                let matched = key[prefix.len()..key.len() - suffix.len()].to_string();
                if best.as_ref().map_or(true, |(p, _, _)| prefix.len() > p.len()) {
                    best = Some((prefix, target, matched));
                }
            }
        }

        let (_, target, matched) = best?;
        Self::resolve_conditional(target, mode, Some(&matched))
    }

    fn resolve_conditional(target: &serde_json::Value, mode: TargetMode, star: Option<&str>) -> Option<String> {
        use serde_json::Value;

        match target {
            Value::String(path) => Some(match star {
                Some(s) => path.replace('*', s),
                None => path.clone(),
            }),
            Value::Array(items) => items
                .iter()
                .find_map(|item| Self::resolve_conditional(item, mode, star)),
            Value::Object(map) => Self::conditions(mode)
                .iter()
                .filter_map(|condition| map.get(*condition))
                .find_map(|value| Self::resolve_conditional(value, mode, star)),
            _ => None,
        }
    }

    async fn resolve_file_or_directory(&self, path: &Path, mode: TargetMode) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path).await {
            return Some(file);
        }

        if !path.is_dir() {
            return None;
        }

        if let Some(pkg) = self.read_package_json(&path.join("package.json")).await {
            for field in Self::entry_fields(&pkg, mode) {
                if let Some(resolved) = self.resolve_as_file(&path.join(field)).await {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(path).await
    }

    async fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let index_file = dir.join(format!("index.{}", ext));
            if index_file.is_file() {
                return Some(index_file);
            }
        }
        None
    }

    /// The path itself, then the path with each known extension appended.
    /// `./x.js` also finds a TypeScript `./x.ts` sibling.
    async fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize(path);
        if path.is_file() {
            return Some(path);
        }

        let file_name = path.file_name()?.to_string_lossy().to_string();
        for ext in EXTENSIONS {
            let candidate = path.with_file_name(format!("{}.{}", file_name, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        let ts_siblings: &[&str] = match path.extension().and_then(|e| e.to_str()) {
            Some("js") => &["ts", "tsx"],
            Some("jsx") => &["tsx"],
            Some("mjs") => &["mts"],
            _ => &[],
        };
        ts_siblings
            .iter()
            .map(|ext| path.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }

    /// Read and cache package.json; unreadable or malformed files count as absent
    async fn read_package_json(&self, path: &Path) -> Option<Arc<PackageJson>> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let parsed = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<PackageJson>(&content) {
                Ok(pkg) => Some(Arc::new(pkg)),
                Err(e) => {
                    Logger::warn(&format!("Ignoring malformed {}: {}", path.display(), e));
                    None
                }
            },
            Err(_) => None,
        };

        self.package_cache.insert(path.to_path_buf(), parsed.clone());
        parsed
    }
}

impl Default for NodeModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse `.` and `..` components without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
