use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use itertools::Itertools;
use tracing::debug;

use rh_fs::Simplified;

use crate::Error;

/// Installs a wheel into a scratch directory, without its dependencies.
///
/// The Conda package is assembled from the installed tree, so the installer decides what
/// `site-packages` contains.
pub trait WheelInstaller {
    fn install(&self, wheel: &Path, target: &Path) -> Result<(), Error>;
}

/// Installs wheels by running `python -m pip install --target`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: PathBuf,
}

impl PipInstaller {
    pub fn new(python: PathBuf) -> Self {
        Self { python }
    }

    /// Use the first `python3` or `python` on the `PATH`.
    pub fn from_path() -> Result<Self, Error> {
        let python = which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(Error::PythonNotFound)?;
        debug!("Using Python interpreter: {}", python.user_display());
        Ok(Self::new(python))
    }
}

impl WheelInstaller for PipInstaller {
    fn install(&self, wheel: &Path, target: &Path) -> Result<(), Error> {
        let args: [&OsStr; 10] = [
            OsStr::new("-m"),
            OsStr::new("pip"),
            OsStr::new("install"),
            wheel.as_os_str(),
            OsStr::new("--target"),
            target.as_os_str(),
            OsStr::new("--no-deps"),
            OsStr::new("--no-compile"),
            OsStr::new("--no-warn-script-location"),
            OsStr::new("--no-warn-conflicts"),
        ];
        let command = std::iter::once(self.python.as_os_str())
            .chain(args)
            .map(|arg| arg.to_string_lossy())
            .join(" ");
        debug!("Running `{command}`");

        let output = Command::new(&self.python)
            .args(args)
            .output()
            .map_err(|err| Error::CommandFailed(self.python.clone(), err))?;
        if !output.status.success() {
            return Err(Error::InstallFailed {
                command,
                exit_code: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
