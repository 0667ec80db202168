//! Host-side directories and files passed into or exported from containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::error::{EngineError, EngineResult};

/// A directory on the host.
///
/// Exported artifacts keep their temporary backing storage alive for as long
/// as any clone (or any child selected from it) exists.
#[derive(Debug, Clone)]
pub struct HostDirectory {
    path: PathBuf,
    _backing: Option<Arc<TempDir>>,
}

impl HostDirectory {
    /// Wrap an existing host path. The directory must exist.
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(EngineError::InvalidSpec(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Self {
            path: path.canonicalize()?,
            _backing: None,
        })
    }

    /// Take ownership of a temp dir (used by engines for exports).
    pub fn from_temp(dir: TempDir) -> Self {
        let path = dir.path().to_path_buf();
        Self {
            path,
            _backing: Some(Arc::new(dir)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A subdirectory, e.g. the docs site below a repository root.
    pub fn directory(&self, sub: impl AsRef<Path>) -> HostDirectory {
        Self {
            path: self.path.join(sub),
            _backing: self._backing.clone(),
        }
    }

    /// A file inside this directory.
    pub fn file(&self, name: impl AsRef<Path>) -> HostFile {
        HostFile {
            path: self.path.join(name),
            _backing: self._backing.clone(),
        }
    }

    /// Copy the tree to `dest` (created if missing).
    pub fn export(&self, dest: &Path) -> EngineResult<()> {
        copy_tree(&self.path, dest)
    }
}

/// A single file on the host.
#[derive(Debug, Clone)]
pub struct HostFile {
    path: PathBuf,
    _backing: Option<Arc<TempDir>>,
}

impl HostFile {
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EngineError::InvalidSpec(format!(
                "{} is not a file",
                path.display()
            )));
        }
        Ok(Self {
            path: path.canonicalize()?,
            _backing: None,
        })
    }

    /// Wrap a file that lives inside an engine-owned temp dir.
    pub fn in_temp(dir: TempDir, name: impl AsRef<Path>) -> Self {
        let path = dir.path().join(name);
        Self {
            path,
            _backing: Some(Arc::new(dir)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn contents(&self) -> EngineResult<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    /// Copy the file to `dest`.
    pub fn export(&self, dest: &Path) -> EngineResult<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.path, dest)?;
        Ok(())
    }
}

fn copy_tree(src: &Path, dest: &Path) -> EngineResult<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdirectory_keeps_temp_backing_alive() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("site/docs")).unwrap();
        std::fs::write(tmp.path().join("site/docs/index.md"), "# hi").unwrap();

        let root = HostDirectory::from_temp(tmp);
        let site = root.directory("site");
        drop(root);

        assert!(site.path().join("docs/index.md").exists());
        assert_eq!(site.file("docs/index.md").contents().unwrap(), "# hi");
    }

    #[test]
    fn from_path_rejects_missing_directory() {
        assert!(HostDirectory::from_path("/definitely/not/here").is_err());
    }

    #[test]
    fn export_copies_nested_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("a/b/c.txt"), "c").unwrap();
        let dir = HostDirectory::from_path(src.path()).unwrap();

        let out = tempfile::tempdir().unwrap();
        dir.export(&out.path().join("copy")).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.path().join("copy/a/b/c.txt")).unwrap(),
            "c"
        );
    }
}
