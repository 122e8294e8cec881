use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

pub use crate::path::*;

mod path;

/// A [`NamedTempFile`] in `dir`, to be [`persist`]ed once complete.
///
/// Unlike [`NamedTempFile::new_in`], the file is created `0o666` (before the umask), the same as
/// a regular file.
pub fn tempfile_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Move a finished temporary file to its final location with an atomic rename.
///
/// A failed build never leaves a truncated file at `path`.
pub fn persist(temp_file: NamedTempFile, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    match temp_file.persist(path) {
        Ok(_) => Ok(()),
        Err(err) => Err(std::io::Error::other(format!(
            "Failed to move the temporary file to {}: {}",
            path.user_display(),
            err.error
        ))),
    }
}

/// Remove a directory tree if it exists, then create it (and its parents) empty.
pub fn replace_directory(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    match fs_err::remove_dir_all(path) {
        Ok(()) => debug!("Removed existing directory: {}", path.user_display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    fs_err::create_dir_all(path)
}

/// Copy a file, creating the parent directories of the destination as needed.
pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> std::io::Result<()> {
    let to = to.as_ref();
    if let Some(parent) = to.parent() {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::copy(from.as_ref(), to)?;
    Ok(())
}

/// Walk up from `start` (inclusive) and return the first directory containing any of `names`.
pub fn find_upwards(start: impl AsRef<Path>, names: &[&str]) -> Option<PathBuf> {
    start
        .as_ref()
        .ancestors()
        .find(|dir| names.iter().any(|name| dir.join(name).is_file()))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_directory_clears_residue() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let build = temp_dir.path().join("build").join("repo_helper_build");
        fs_err::create_dir_all(build.join("old")).unwrap();
        fs_err::write(build.join("old").join("stale.py"), "").unwrap();

        replace_directory(&build).unwrap();
        assert!(build.is_dir());
        assert_eq!(fs_err::read_dir(&build).unwrap().count(), 0);

        // Idempotent.
        replace_directory(&build).unwrap();
        assert!(build.is_dir());
    }

    #[test]
    fn find_upwards_stops_at_first_match() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        let nested = repo.join("src").join("pkg");
        fs_err::create_dir_all(&nested).unwrap();
        fs_err::write(repo.join("repo_helper.yml"), "").unwrap();

        assert_eq!(
            find_upwards(&nested, &["repo_helper.yml", "git_helper.yml"]),
            Some(repo.clone())
        );
        assert_eq!(find_upwards(temp_dir.path(), &["repo_helper.yml"]), None);
    }

    #[test]
    fn persist_moves_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let temp_file = tempfile_in(temp_dir.path()).unwrap();
        fs_err::write(temp_file.path(), "contents").unwrap();
        let target = temp_dir.path().join("final.txt");
        persist(temp_file, &target).unwrap();
        assert_eq!(fs_err::read_to_string(target).unwrap(), "contents");
    }
}
