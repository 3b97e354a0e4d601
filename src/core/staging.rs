use crate::utils::error::{Result, ServiceError};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The root filesystem of an image under construction. Image paths
/// (`/app`, `/opt/deps`) are resolved beneath it.
#[derive(Debug, Clone)]
pub struct StagingRoot {
    rootfs: PathBuf,
}

impl StagingRoot {
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
        }
    }

    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    pub fn resolve(&self, image_path: &str) -> PathBuf {
        let mut resolved = self.rootfs.clone();
        for component in Path::new(image_path).components() {
            if let Component::Normal(part) = component {
                resolved.push(part);
            }
        }
        resolved
    }

    pub fn create_dir(&self, image_path: &str) -> Result<PathBuf> {
        let dir = self.resolve(image_path);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Copies `source` byte-for-byte into the image directory, keeping its
    /// file name.
    pub fn copy_file_into(&self, source: &Path, image_dir: &str) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| ServiceError::staging(source, "source has no file name"))?;
        if !source.is_file() {
            return Err(ServiceError::staging(source, "source file does not exist"));
        }

        let dest = self.create_dir(image_dir)?.join(file_name);
        fs::copy(source, &dest).map_err(|e| ServiceError::staging(source, e.to_string()))?;
        tracing::debug!("Staged {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    pub fn list_dir(&self, image_path: &str) -> Result<BTreeSet<String>> {
        let mut entries = BTreeSet::new();
        for entry in fs::read_dir(self.resolve(image_path))? {
            entries.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(entries)
    }
}

/// Recursive copy. Symlinks are recreated with the same link text rather
/// than followed, so package trees keep their internal aliases.
pub fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(&entry.path(), &dest)?;
        } else if file_type.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest)?;
    }
    std::os::unix::fs::symlink(fs::read_link(link)?, dest)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    if link.is_dir() {
        copy_dir_all(link, dest)
    } else {
        fs::copy(link, dest).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_strips_root_and_parent_components() {
        let root = StagingRoot::new("/tmp/rootfs");
        assert_eq!(root.resolve("/app"), PathBuf::from("/tmp/rootfs/app"));
        assert_eq!(root.resolve("/../etc"), PathBuf::from("/tmp/rootfs/etc"));
    }

    #[test]
    fn test_copy_file_into_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("app.log");
        let content = b"line one\r\nline two\x00\xff";
        fs::write(&source, content).unwrap();

        let root = StagingRoot::new(dir.path().join("rootfs"));
        let dest = root.copy_file_into(&source, "/app").unwrap();

        assert_eq!(fs::read(dest).unwrap(), content);
        assert_eq!(
            root.list_dir("/app").unwrap(),
            BTreeSet::from(["app.log".to_string()])
        );
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let root = StagingRoot::new(dir.path().join("rootfs"));
        let err = root
            .copy_file_into(&dir.path().join("missing.py"), "/app")
            .unwrap_err();
        assert!(matches!(err, ServiceError::StagingError { .. }));
    }

    #[test]
    fn test_copy_dir_all_recurses() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("from");
        fs::create_dir_all(from.join("pkg/sub")).unwrap();
        fs::write(from.join("pkg/sub/mod.txt"), "x").unwrap();

        let to = dir.path().join("to");
        copy_dir_all(&from, &to).unwrap();

        assert_eq!(fs::read_to_string(to.join("pkg/sub/mod.txt")).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dir_all_recreates_symlinks() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("from");
        fs::create_dir_all(from.join("fastapi/pkg")).unwrap();
        fs::write(from.join("fastapi/pkg/__init__.py"), "").unwrap();
        std::os::unix::fs::symlink("fastapi/pkg", from.join("alias")).unwrap();
        std::os::unix::fs::symlink("fastapi/pkg/__init__.py", from.join("init.py")).unwrap();

        let to = dir.path().join("to");
        copy_dir_all(&from, &to).unwrap();

        let alias = to.join("alias");
        assert!(alias.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&alias).unwrap(), PathBuf::from("fastapi/pkg"));
        assert!(alias.join("__init__.py").is_file());
        assert!(to.join("init.py").is_file());
    }
}
