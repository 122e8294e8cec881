use std::path::{Path, PathBuf};
use std::str::FromStr;

use rh_fs::Simplified;
use rh_pep508::Requirement;
use rh_warnings::warn_user;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RequirementsError {
    #[error("Failed to read requirements file: `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// The parsed contents of a `requirements.txt` style file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequirementsFile {
    /// The valid requirements, in file order. Duplicates are not merged.
    pub requirements: Vec<Requirement>,
    /// Full-line comments, without the leading `#` and surrounding whitespace.
    pub comments: Vec<String>,
}

impl RequirementsFile {
    /// Parse the contents of a requirements file.
    ///
    /// Blank lines are skipped and full-line comments are collected. A `#` preceded by whitespace
    /// starts a trailing comment, which is dropped. Lines that don't parse as a PEP 508
    /// requirement (including pip options such as `-r other.txt`) are skipped with a warning;
    /// `source` names the file in that warning.
    pub fn parse(content: &str, source: &Path) -> Self {
        let mut file = Self::default();
        for (line_number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                file.comments.push(comment.trim().to_string());
                continue;
            }
            let line = strip_trailing_comment(line);
            match Requirement::from_str(line) {
                Ok(requirement) => file.requirements.push(requirement),
                Err(err) => {
                    warn_user!(
                        "Ignoring invalid requirement `{line}` at {}:{}: {}",
                        source.user_display(),
                        line_number + 1,
                        err.message
                    );
                }
            }
        }
        file
    }
}

/// Drop a trailing ` # comment`. A `#` without leading whitespace is kept, since it may be a URL
/// fragment.
fn strip_trailing_comment(line: &str) -> &str {
    line.char_indices()
        .find(|&(index, c)| c == '#' && line[..index].ends_with(char::is_whitespace))
        .map_or(line, |(index, _)| line[..index].trim_end())
}

/// Read a `requirements.txt` style file.
///
/// I/O errors (including a missing file) are returned; invalid lines are not. See
/// [`RequirementsFile::parse`].
pub fn read_requirements(path: impl AsRef<Path>) -> Result<RequirementsFile, RequirementsError> {
    let path = path.as_ref();
    let content = fs_err::read_to_string(path).map_err(|err| RequirementsError::Io {
        path: path.to_path_buf(),
        err,
    })?;
    let file = RequirementsFile::parse(&content, path);
    debug!(
        "Read {} requirement(s) from: {}",
        file.requirements.len(),
        path.user_display()
    );
    Ok(file)
}
