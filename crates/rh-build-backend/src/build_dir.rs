use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use rh_fs::Simplified;

use crate::Error;

/// A file in the build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagedFile {
    /// The file the staged copy was made from, or `None` if it was generated.
    pub(crate) source: Option<PathBuf>,
    /// The `/`-separated path relative to the build directory.
    pub(crate) relative: String,
    /// The absolute path of the staged copy.
    pub(crate) path: PathBuf,
}

/// The transient directory a distribution is assembled in.
///
/// Each build starts from [`BuildDirectory::prepare`], which removes everything a previous build
/// left behind. Files are only ever added through this type, so it knows where each staged file
/// came from.
#[derive(Debug)]
pub(crate) struct BuildDirectory {
    root: PathBuf,
    /// Staged copies, keyed by their relative path, and the file they were copied from.
    sources: BTreeMap<String, PathBuf>,
}

impl BuildDirectory {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sources: BTreeMap::new(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the build directory if it exists and recreate it empty.
    pub(crate) fn clear(&mut self) -> io::Result<()> {
        rh_fs::replace_directory(&self.root)?;
        self.sources.clear();
        Ok(())
    }

    /// Clear the build directory and create the package directory inside it.
    pub(crate) fn prepare(&mut self, pkg_dir: &str) -> io::Result<()> {
        self.clear()?;
        fs_err::create_dir_all(self.root.join(pkg_dir))?;
        debug!("Prepared build directory: {}", self.root.user_display());
        Ok(())
    }

    /// The `.dist-info` directory of a wheel, created on first access.
    pub(crate) fn dist_info_path(&self, dist_info_dir: &str) -> io::Result<PathBuf> {
        let path = self.root.join(dist_info_dir);
        fs_err::create_dir_all(&path)?;
        Ok(path)
    }

    /// The `info` directory of a Conda package, created on first access.
    pub(crate) fn info_path(&self) -> io::Result<PathBuf> {
        let path = self.root.join("info");
        fs_err::create_dir_all(&path)?;
        Ok(path)
    }

    /// Copy `source` to `relative` in the build directory.
    pub(crate) fn copy_in(&mut self, source: &Path, relative: &str) -> io::Result<()> {
        let target = self.root.join(relative);
        rh_fs::copy_file(source, &target)?;
        debug!(
            "Copying {} -> {}",
            source.user_display(),
            target.user_display()
        );
        self.sources
            .insert(relative.to_string(), source.to_path_buf());
        Ok(())
    }

    /// Write a generated file to `relative` in the build directory.
    pub(crate) fn write(&mut self, relative: &str, contents: impl AsRef<[u8]>) -> io::Result<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(&target, contents)?;
        debug!("Writing {}", target.user_display());
        self.sources.remove(relative);
        Ok(())
    }

    /// Remove a staged file.
    pub(crate) fn remove(&mut self, path: &Path) -> io::Result<()> {
        fs_err::remove_file(path)?;
        debug!("Removing {}", path.user_display());
        if let Ok(relative) = path.strip_prefix(&self.root) {
            self.sources.remove(&*relative.portable_display());
        }
        Ok(())
    }

    /// Every regular file below `relative_dir` (the whole build directory if empty), in a stable
    /// order.
    pub(crate) fn files(&self, relative_dir: &str) -> Result<Vec<StagedFile>, Error> {
        let root = self.root.join(relative_dir);
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|err| Error::WalkDir {
                root: root.clone(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative.portable_display().to_string();
            files.push(StagedFile {
                source: self.sources.get(&relative).cloned(),
                relative,
                path: entry.into_path(),
            });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::BuildDirectory;

    #[test]
    fn prepare_removes_residue() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("build").join("repo_helper_build");
        let mut build_dir = BuildDirectory::new(&root);

        build_dir.prepare("src/pkg").unwrap();
        build_dir.write("src/pkg/stale.py", "").unwrap();
        build_dir.dist_info_path("pkg-1.0.dist-info").unwrap();

        build_dir.prepare("src/pkg").unwrap();
        assert!(root.join("src").join("pkg").is_dir());
        assert!(!root.join("src").join("pkg").join("stale.py").exists());
        assert!(!root.join("pkg-1.0.dist-info").exists());
        assert!(build_dir.files("").unwrap().is_empty());
    }

    #[test]
    fn files_remember_their_source() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        fs_err::create_dir_all(&repo).unwrap();
        fs_err::write(repo.join("README.rst"), "Readme").unwrap();
        fs_err::write(repo.join("LICENSE"), "License").unwrap();

        let mut build_dir = BuildDirectory::new(temp_dir.path().join("build"));
        build_dir.prepare("pkg").unwrap();
        build_dir.copy_in(&repo.join("README.rst"), "README.rst").unwrap();
        build_dir.copy_in(&repo.join("LICENSE"), "LICENSE").unwrap();
        build_dir.write("PKG-INFO", "Metadata-Version: 2.1\n").unwrap();
        let license = build_dir.root().join("LICENSE");
        build_dir.remove(&license).unwrap();

        let files: Vec<_> = build_dir
            .files("")
            .unwrap()
            .into_iter()
            .map(|file| (file.relative, file.source.is_some()))
            .collect();
        assert_eq!(
            files,
            [("PKG-INFO".to_string(), false), ("README.rst".to_string(), true)]
        );
        assert_eq!(
            fs_err::read_to_string(build_dir.root().join("README.rst")).unwrap(),
            "Readme"
        );
    }

    #[test]
    fn info_path_is_created_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let mut build_dir = BuildDirectory::new(temp_dir.path().join("build"));
        build_dir.clear().unwrap();
        assert!(!build_dir.root().join("info").exists());
        let info = build_dir.info_path().unwrap();
        assert!(info.is_dir());
        assert_eq!(info, build_dir.root().join("info"));
    }
}
