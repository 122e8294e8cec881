use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// The working directory at startup, against which [`Simplified::user_display`] shortens paths.
pub static CWD: LazyLock<PathBuf> =
    LazyLock::new(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub trait Simplified {
    /// The path without a Windows verbatim (`\\?\`) prefix.
    fn simplified(&self) -> &Path;

    /// The path relative to the working directory if it lies below it, as shown in messages.
    fn user_display(&self) -> std::path::Display<'_>;

    /// The path with `/` separators, as used for archive members and `RECORD` entries.
    fn portable_display(&self) -> Cow<'_, str>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn simplified(&self) -> &Path {
        dunce::simplified(self.as_ref())
    }

    fn user_display(&self) -> std::path::Display<'_> {
        let path = self.simplified();
        // Below `/`, every absolute path would lose its leading slash.
        if CWD.parent().is_none() {
            return path.display();
        }
        path.strip_prefix(CWD.simplified())
            .unwrap_or(path)
            .display()
    }

    fn portable_display(&self) -> Cow<'_, str> {
        let path = self.as_ref().to_string_lossy();
        if std::path::MAIN_SEPARATOR == '/' {
            path
        } else {
            Cow::Owned(path.replace(std::path::MAIN_SEPARATOR, "/"))
        }
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
///
/// A `..` at the root stays at the root.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref()
        .components()
        .fold(PathBuf::new(), |mut normalized, component| {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                    normalized.push(component);
                }
            }
            normalized
        })
}

/// `path` relative to `base`, after normalizing both. Fails if `path` is not below `base`.
pub fn relative_to(path: impl AsRef<Path>, base: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let path = normalize_path(path);
    let base = normalize_path(base);
    match path.strip_prefix(&base) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Err(std::io::Error::other(format!(
            "`{}` is not inside `{}`",
            path.simplified().display(),
            base.simplified().display()
        ))),
    }
}
