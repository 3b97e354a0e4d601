use crate::core::staging::copy_dir_all;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const MARKER_FILE: &str = "layer.json";
const CONTENT_DIR: &str = "content";

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn file_digest(path: &Path) -> Result<String> {
    Ok(sha256_hex(&fs::read(path)?))
}

/// Key of a layer: its parent's key, its instruction, and the digests of
/// any file content it consumes. A change anywhere upstream changes every
/// key below it.
pub fn chain_key(parent: &str, instruction: &str, content_digests: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update(b"\n");
    hasher.update(instruction.as_bytes());
    for digest in content_digests {
        hasher.update(b"\n");
        hasher.update(digest.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerMarker {
    key: String,
    step: String,
    created_at: String,
}

/// Snapshots of layer outputs keyed by chained layer key. A snapshot only
/// counts once its marker is written.
#[derive(Debug, Clone)]
pub struct LayerCache {
    root: PathBuf,
}

impl LayerCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn layer_dir(&self, key: &str) -> PathBuf {
        self.root.join("layers").join(key)
    }

    pub fn lookup(&self, key: &str) -> Option<PathBuf> {
        let dir = self.layer_dir(key);
        let content = dir.join(CONTENT_DIR);
        (dir.join(MARKER_FILE).is_file() && content.is_dir()).then_some(content)
    }

    pub fn store(&self, key: &str, step: &str, from: &Path) -> Result<()> {
        let layers = self.root.join("layers");
        fs::create_dir_all(&layers)?;

        let staging = layers.join(format!(".{}.partial-{}", key, std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        copy_dir_all(from, &staging.join(CONTENT_DIR))?;

        let marker = LayerMarker {
            key: key.to_string(),
            step: step.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        fs::write(
            staging.join(MARKER_FILE),
            serde_json::to_vec_pretty(&marker)?,
        )?;

        let dir = self.layer_dir(key);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::rename(&staging, &dir)?;

        tracing::debug!("Cached layer {} ({})", &key[..12.min(key.len())], step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chain_key_depends_on_parent_and_content() {
        let base = chain_key("", "FROM python:3.11-slim", &[]);
        let a = chain_key(&base, "COPY requirements.txt ./", &[sha256_hex(b"fastapi")]);
        let b = chain_key(&base, "COPY requirements.txt ./", &[sha256_hex(b"flask")]);
        let c = chain_key(&a, "RUN install", &[]);
        let d = chain_key(&b, "RUN install", &[]);

        assert_ne!(a, b);
        assert_ne!(c, d);
        assert_eq!(a, chain_key(&base, "COPY requirements.txt ./", &[sha256_hex(b"fastapi")]));
    }

    #[test]
    fn test_store_then_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = LayerCache::new(dir.path().join("cache"));
        let source = dir.path().join("deps");
        fs::create_dir_all(source.join("fastapi")).unwrap();
        fs::write(source.join("fastapi/__init__.py"), "").unwrap();

        assert!(cache.lookup("abc").is_none());
        cache.store("abc", "install-dependencies", &source).unwrap();

        let content = cache.lookup("abc").unwrap();
        assert!(content.join("fastapi/__init__.py").is_file());
    }

    #[test]
    fn test_lookup_ignores_unmarked_layer() {
        let dir = TempDir::new().unwrap();
        let cache = LayerCache::new(dir.path());
        fs::create_dir_all(dir.path().join("layers/abc/content")).unwrap();

        assert!(cache.lookup("abc").is_none());
    }
}
