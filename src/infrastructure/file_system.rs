use crate::core::interfaces::FileSystemService;
use crate::utils::{HostpackError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(HostpackError::Io)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HostpackError::write(parent, e))?;
        }

        fs::write(path, content)
            .await
            .map_err(|e| HostpackError::write(path, e))
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| HostpackError::write(path, e))
    }

    async fn scan_tree(&self, root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(HostpackError::Io)?;

            while let Some(entry) = entries.next_entry().await.map_err(HostpackError::Io)? {
                let path = entry.path();
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let file_type = entry.file_type().await.map_err(HostpackError::Io)?;

                if file_type.is_dir() {
                    if !name.starts_with('.') && name != "node_modules" {
                        pending.push(path);
                    }
                    continue;
                }

                let extension = path
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_lowercase();

                if extensions.contains(&extension.as_str()) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_operations() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let test_file = temp_dir.path().join("nested/dir/test.txt");

        let content = "Hello, host!";
        fs_service.write_file(&test_file, content).await.unwrap();

        let read_content = fs_service.read_file(&test_file).await.unwrap();
        assert_eq!(content, read_content);
        assert!(fs_service.file_exists(&test_file));
        assert!(!fs_service.file_exists(temp_dir.path()));
    }

    #[tokio::test]
    async fn test_scan_tree_filters_and_skips() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();

        for file in [
            "main.tsx",
            "components/Button.jsx",
            "index.html",
            "styles.css",
            "node_modules/lib/index.js",
            ".cache/old.js",
        ] {
            fs_service.write_file(&root.join(file), "x").await.unwrap();
        }

        let found = fs_service
            .scan_tree(root, &["tsx", "jsx", "js", "html"])
            .await
            .unwrap();

        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["components/Button.jsx", "index.html", "main.tsx"]);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();

        let err = fs_service
            .read_file(&temp_dir.path().join("missing.ts"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "IoError");
    }
}
