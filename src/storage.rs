// src/storage.rs
//! Local-directory asset store. Files are served back through `/assets/:filename`.

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::generators::AssetStore;

lazy_static! {
    static ref SAFE_EXTENSION: Regex = Regex::new(r"^[A-Za-z0-9]{1,8}$").unwrap();
    static ref STORED_NAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/assets/{}", self.public_base_url, urlencoding::encode(filename))
    }

    pub fn resolve(&self, filename: &str) -> Result<PathBuf, PipelineError> {
        resolve_asset_path(&self.root, filename)
    }
}

/// Maps a served filename back to its path, refusing anything outside `root`.
pub fn resolve_asset_path(root: &Path, filename: &str) -> Result<PathBuf, PipelineError> {
    if !STORED_NAME.is_match(filename) || filename.contains("..") {
        return Err(PipelineError::NotFound(format!("Asset '{}' not found", filename)));
    }
    Ok(root.join(filename))
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(
        &self,
        data: Vec<u8>,
        suggested_name: &str,
        default_extension: &str,
    ) -> Result<String, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::Validation("No file provided".to_string()));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let filename = unique_filename(suggested_name, default_extension);
        let path = self.root.join(&filename);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            PipelineError::Storage(format!("Failed to write {}: {}", path.display(), e))
        })?;

        tracing::info!("💾 Stored asset {} ({} bytes)", filename, data.len());
        Ok(self.url_for(&filename))
    }
}

/// `<prefix>-<epoch millis>-<7 base36 chars>.<ext>`
pub fn unique_filename(suggested_name: &str, default_extension: &str) -> String {
    let (stem, extension) = split_name(suggested_name);
    let prefix = sanitize_prefix(stem);
    let extension = extension
        .filter(|ext| SAFE_EXTENSION.is_match(ext))
        .unwrap_or(default_extension)
        .to_ascii_lowercase();

    format!("{}-{}-{}.{}", prefix, Utc::now().timestamp_millis(), random_suffix(7), extension)
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    // Only the final path component counts; browsers sometimes send full paths.
    let name = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn sanitize_prefix(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_ascii_lowercase() } else { '-' })
        .take(40)
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '_');
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned.to_string()
    }
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_filename_shape() {
        let name = unique_filename("Summer Shoot.PNG", "jpg");
        let re = Regex::new(r"^summer-shoot-\d{13}-[0-9a-z]{7}\.png$").unwrap();
        assert!(re.is_match(&name), "unexpected name {}", name);
    }

    #[test]
    fn test_missing_or_unsafe_extension_uses_default() {
        assert!(unique_filename("photo", "jpg").ends_with(".jpg"));
        assert!(unique_filename("photo.tar.gz!", "jpg").ends_with(".jpg"));
        let hidden = unique_filename(".hidden", "png");
        assert!(hidden.starts_with("hidden-") && hidden.ends_with(".png"));
        assert!(unique_filename("C:\\Users\\me\\pic.webp", "jpg").starts_with("pic-"));
    }

    #[test]
    fn test_names_do_not_collide() {
        let a = unique_filename("ad-image", "png");
        let b = unique_filename("ad-image", "png");
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = LocalAssetStore::new("/tmp/assets", "http://localhost:3000/");
        assert_matches!(store.resolve("../etc/passwd"), Err(PipelineError::NotFound(_)));
        assert_matches!(store.resolve("a/b.png"), Err(PipelineError::NotFound(_)));
        assert_eq!(store.resolve("ad-image-1-abc.png").unwrap(), PathBuf::from("/tmp/assets/ad-image-1-abc.png"));
        assert_eq!(store.url_for("x y.png"), "http://localhost:3000/assets/x%20y.png");
    }

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path().join("assets"), "http://localhost:3000");

        let url = store.put(b"fake-png".to_vec(), "ad-image", "png").await.unwrap();
        assert!(url.starts_with("http://localhost:3000/assets/ad-image-"));

        let filename = url.rsplit('/').next().unwrap();
        let stored = tokio::fs::read(store.resolve(filename).unwrap()).await.unwrap();
        assert_eq!(stored, b"fake-png");
    }

    #[tokio::test]
    async fn test_put_rejects_empty_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path(), "http://localhost:3000");
        assert_matches!(store.put(Vec::new(), "x.png", "png").await, Err(PipelineError::Validation(_)));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
