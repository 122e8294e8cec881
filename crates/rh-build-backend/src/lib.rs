//! Build wheels, source distributions and Conda packages from a repository configured with
//! `repo_helper.yml`.
//!
//! Every build stages its files in a build directory first (see [`Builder`]), writes the
//! metadata next to them and then archives the staged tree.

mod archive;
mod build_dir;
mod builder;
mod channels;
mod conda;
mod entry_points;
mod glob;
mod installer;
mod metadata;
mod source;
mod source_dist;
mod wheel;

pub use builder::{
    Builder, build_sdist, build_wheel, get_requires_for_build_sdist,
    get_requires_for_build_wheel,
};
pub use channels::{ChannelIndex, CondaApi};
pub use conda::CondaStage;
pub use installer::{PipInstaller, WheelInstaller};
pub use metadata::{CoreMetadata, compose};
pub use source::{ManifestRule, iter_source_files};

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

use rh_configuration::ConfigError;
use rh_fs::Simplified;
use rh_normalize::{ExtraName, PackageName};
use rh_pep508::Pep508Error;
use rh_requirements::RequirementsError;

use crate::build_dir::StagedFile;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Requirements(#[from] RequirementsError),
    #[error("Invalid requirement `{requirement}` in extra `{extra}`")]
    Requirement {
        extra: ExtraName,
        requirement: String,
        #[source]
        err: Box<Pep508Error>,
    },
    #[error(
        "Invalid entry point `{entry}` in group `{group}`, expected `name = object reference`"
    )]
    EntryPoint { group: String, entry: String },
    #[error("Package directory not found: {}", _0.user_display())]
    MissingPackageDir(PathBuf),
    #[error("Source distribution file not found: {}", _0.user_display())]
    MissingSdistFile(PathBuf),
    /// Either an absolute path or a parent path through `..`.
    #[error("Manifest rule directory must be inside the repository: `{0}`")]
    InvalidManifestDirectory(String),
    #[error("Failed to walk source tree: {}", root.user_display())]
    WalkDir {
        root: PathBuf,
        #[source]
        err: walkdir::Error,
    },
    #[error("Failed to write wheel zip archive")]
    Zip(#[from] zip::result::ZipError),
    #[error("Failed to write RECORD file")]
    Csv(#[from] csv::Error),
    #[error("Failed to write to {}", path.user_display())]
    TarWrite {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("Failed to serialize `{0}`")]
    Json(&'static str, #[source] serde_json::Error),
    #[error("Failed to find a Python interpreter to install the wheel with")]
    PythonNotFound(#[source] which::Error),
    #[error("Failed to run {}", _0.user_display())]
    CommandFailed(PathBuf, #[source] io::Error),
    #[error(
        "`{command}` failed with {exit_code}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---"
    )]
    InstallFailed {
        command: String,
        exit_code: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("Failed to create the HTTP client")]
    HttpClient(#[source] reqwest::Error),
    #[error("Failed to fetch the package list of the Conda channel `{channel}`")]
    Channel {
        channel: String,
        #[source]
        err: reqwest::Error,
    },
    #[error("Cannot satisfy the requirement `{name}` from any of the channels: {channels}")]
    UnavailableRequirement { name: PackageName, channels: String },
    #[error("Failed to build the Conda package while {stage}")]
    CondaStage {
        stage: CondaStage,
        #[source]
        source: Box<Error>,
    },
}

/// Dispatcher between writing to a zip, writing to a `.tar.gz` or `.tar.bz2` and listing files.
///
/// All paths are string types instead of path types since archives are portable between
/// platforms.
///
/// Contract: You must call close before dropping to obtain a valid output (dropping is fine in the
/// error case, the output path is only written on close).
trait ArchiveWriter {
    /// Add a file with the given content.
    ///
    /// Files added through the method are considered generated when listing included files.
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error>;

    /// Add a file from the build directory.
    fn write_file(&mut self, path: &str, file: &StagedFile) -> Result<(), Error>;

    /// Write the `RECORD` file if applicable and move the archive to its final location.
    fn close(self, dist_info_dir: &str) -> Result<(), Error>;
}

/// Name of the file in the archive and path outside, if it wasn't generated.
pub type FileList = Vec<(String, Option<PathBuf>)>;

/// A dummy writer to collect the file names that would be included in a build.
struct ListWriter<'a> {
    files: &'a mut FileList,
}

impl<'a> ListWriter<'a> {
    fn new(files: &'a mut FileList) -> Self {
        Self { files }
    }
}

impl ArchiveWriter for ListWriter<'_> {
    fn write_bytes(&mut self, path: &str, _bytes: &[u8]) -> Result<(), Error> {
        self.files.push((path.to_string(), None));
        Ok(())
    }

    fn write_file(&mut self, path: &str, file: &StagedFile) -> Result<(), Error> {
        self.files.push((path.to_string(), file.source.clone()));
        Ok(())
    }

    fn close(self, _dist_info_dir: &str) -> Result<(), Error> {
        Ok(())
    }
}

/// Whether the file has any executable bit set. Windows has no executable bit.
fn is_executable(path: &Path) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(fs_err::metadata(path)?.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(false)
    }
}

/// The permissions stored in an archive: reasonable defaults that avoid 0o000, while keeping the
/// exact filesystem permissions out of the archive for reproducibility.
fn archive_mode(path: &Path) -> io::Result<u32> {
    if is_executable(path)? {
        Ok(0o755)
    } else {
        Ok(0o644)
    }
}
