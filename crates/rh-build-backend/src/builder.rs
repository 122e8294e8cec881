use std::path::{Path, PathBuf};

use tracing::debug;

use rh_configuration::{PackageConfig, find_repository, source_date_epoch};
use rh_distribution_filename::{SourceDistFilename, WheelFilename};
use rh_fs::Simplified;

use crate::Error;
use crate::build_dir::BuildDirectory;
use crate::source::{copy_manifest_additional, copy_sources};

/// Builds the distributions of one repository.
///
/// A build moves through the states `EMPTY → STAGED → METADATA_WRITTEN → CLOSED`. Each transition
/// consumes the token of the previous state, so an archive can only be written after its metadata
/// and the metadata only after the sources are staged.
#[derive(Debug)]
pub struct Builder {
    pub(crate) repo_dir: PathBuf,
    pub(crate) config: PackageConfig,
    pub(crate) build_dir: BuildDirectory,
    pub(crate) out_dir: PathBuf,
    source_date_epoch: Option<u64>,
}

/// The sources and manifest files are copied into the build directory.
#[derive(Debug)]
pub(crate) struct Staged(());

/// The metadata files are written, the archive can be assembled.
#[derive(Debug)]
pub(crate) struct MetadataWritten {
    /// The `.dist-info` directory of a wheel or the top level directory of a source distribution.
    pub(crate) archive_dir: String,
}

impl Builder {
    /// Locate the repository containing `repo_dir`, load its configuration and prepare the build
    /// and output directories.
    ///
    /// The build directory defaults to `<repository>/build/repo_helper_build` and the output
    /// directory to `<repository>/dist`.
    pub fn new(
        repo_dir: &Path,
        build_dir: Option<&Path>,
        out_dir: Option<&Path>,
    ) -> Result<Self, Error> {
        let repo_dir = find_repository(repo_dir)?;
        debug!("Found repository at: {}", repo_dir.user_display());
        let config = PackageConfig::from_repository(&repo_dir)?;
        let source_date_epoch = source_date_epoch()?;

        let build_dir = match build_dir {
            Some(build_dir) => std::path::absolute(build_dir)?,
            None => repo_dir.join("build").join("repo_helper_build"),
        };
        let out_dir = match out_dir {
            Some(out_dir) => std::path::absolute(out_dir)?,
            None => repo_dir.join("dist"),
        };

        let mut build_dir = BuildDirectory::new(build_dir);
        build_dir.prepare(&config.pkg_dir())?;
        fs_err::create_dir_all(&out_dir)?;

        Ok(Self {
            repo_dir,
            config,
            build_dir,
            out_dir,
            source_date_epoch,
        })
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn build_dir(&self) -> &Path {
        self.build_dir.root()
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Seconds since the Unix epoch for archive timestamps.
    pub(crate) fn mtime(&self) -> u64 {
        self.source_date_epoch.unwrap_or_default()
    }

    pub(crate) fn source_date_epoch(&self) -> Option<u64> {
        self.source_date_epoch
    }

    pub(crate) fn wheel_filename(&self) -> WheelFilename {
        WheelFilename::new(self.config.name.clone(), self.config.version.clone())
    }

    pub(crate) fn sdist_filename(&self) -> SourceDistFilename {
        SourceDistFilename::new(self.config.name.clone(), self.config.version.clone())
    }

    /// `EMPTY → STAGED`: start from an empty build directory and copy the package sources and
    /// the files selected by `manifest_additional` into it.
    pub(crate) fn stage(&mut self) -> Result<Staged, Error> {
        let pkg_dir = self.config.pkg_dir();
        self.build_dir.prepare(&pkg_dir)?;
        copy_sources(&self.repo_dir, &pkg_dir, &mut self.build_dir)?;
        copy_manifest_additional(
            &self.config.manifest_additional,
            &self.repo_dir,
            &mut self.build_dir,
        )?;
        Ok(Staged(()))
    }
}

/// PEP 517 hook: build a wheel of the repository in the current directory into
/// `wheel_directory`.
pub fn build_wheel(wheel_directory: &Path) -> Result<WheelFilename, Error> {
    build_wheel_in(&std::env::current_dir()?, wheel_directory)
}

/// PEP 517 hook: build a source distribution of the repository in the current directory into
/// `sdist_directory`.
pub fn build_sdist(sdist_directory: &Path) -> Result<SourceDistFilename, Error> {
    build_sdist_in(&std::env::current_dir()?, sdist_directory)
}

/// PEP 517 hook: building a wheel needs no additional packages.
pub fn get_requires_for_build_wheel() -> Vec<String> {
    Vec::new()
}

/// PEP 517 hook: building a source distribution needs no additional packages.
pub fn get_requires_for_build_sdist() -> Vec<String> {
    Vec::new()
}

fn build_wheel_in(source_tree: &Path, wheel_directory: &Path) -> Result<WheelFilename, Error> {
    let build_dir = tempfile::tempdir()?;
    let mut builder = Builder::new(source_tree, Some(build_dir.path()), Some(wheel_directory))?;
    builder.build_wheel()
}

fn build_sdist_in(
    source_tree: &Path,
    sdist_directory: &Path,
) -> Result<SourceDistFilename, Error> {
    let build_dir = tempfile::tempdir()?;
    let mut builder = Builder::new(source_tree, Some(build_dir.path()), Some(sdist_directory))?;
    builder.build_sdist()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{build_sdist_in, build_wheel_in, get_requires_for_build_wheel};
    use crate::tests::repository;

    #[test]
    fn pep517_hooks() {
        let repo = repository();
        let out = TempDir::new().unwrap();

        let wheel = build_wheel_in(repo.path(), out.path()).unwrap();
        assert_eq!(wheel.to_string(), "repo_helper-2020.12.18-py3-none-any.whl");
        let sdist = build_sdist_in(&repo.path().join("repo_helper"), out.path()).unwrap();
        assert_eq!(sdist.to_string(), "repo_helper-2020.12.18.tar.gz");

        assert!(out.path().join(wheel.to_string()).is_file());
        assert!(out.path().join(sdist.to_string()).is_file());
        // The temporary build directory is not left inside the repository.
        assert!(!repo.path().join("build").exists());
        assert!(get_requires_for_build_wheel().is_empty());
    }
}
