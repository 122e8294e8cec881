use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use rh_normalize::{InvalidNameError, PackageName};
use rh_pep440::{Version, VersionParseError};

/// The filename of a `.tar.gz` source distribution, e.g. `repo_helper-2020.12.18.tar.gz`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
}

impl SourceDistFilename {
    pub fn new(name: PackageName, version: Version) -> Self {
        Self { name, version }
    }

    /// The directory every archive member lives under, e.g. `repo_helper-2020.12.18`.
    pub fn top_level_dir(&self) -> String {
        format!("{}-{}", self.name.as_dist_info_name(), self.version)
    }
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.tar.gz", self.top_level_dir())
    }
}

/// Parses the escaped `{name}-{version}.tar.gz` form written by [`Display`].
///
/// Versions never contain a `-` once normalized, so the name ends at the last one.
impl FromStr for SourceDistFilename {
    type Err = SourceDistFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let err = |kind| SourceDistFilenameError {
            filename: filename.to_string(),
            kind,
        };

        let stem = filename
            .strip_suffix(".tar.gz")
            .ok_or_else(|| err(SourceDistFilenameErrorKind::Extension))?;
        let (name, version) = stem
            .rsplit_once('-')
            .ok_or_else(|| err(SourceDistFilenameErrorKind::Separator))?;

        let name = PackageName::from_str(name)
            .map_err(|source| err(SourceDistFilenameErrorKind::Name(source)))?;
        let version = Version::from_str(version)
            .map_err(|source| err(SourceDistFilenameErrorKind::Version(source)))?;

        Ok(Self::new(name, version))
    }
}

#[derive(Error, Debug, Clone)]
#[error("Failed to parse source distribution filename {filename}: {kind}")]
pub struct SourceDistFilenameError {
    filename: String,
    kind: SourceDistFilenameErrorKind,
}

#[derive(Error, Debug, Clone)]
enum SourceDistFilenameErrorKind {
    #[error("File extension is invalid, expected `.tar.gz`")]
    Extension,
    #[error("Expected `<name>-<version>`")]
    Separator,
    #[error("Name section is invalid")]
    Name(#[source] InvalidNameError),
    #[error("Version section is invalid")]
    Version(#[source] VersionParseError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;

    use rh_normalize::PackageName;
    use rh_pep440::Version;

    use super::SourceDistFilename;

    #[test]
    fn display() {
        let filename = SourceDistFilename::new(
            PackageName::from_str("Repo_Helper").unwrap(),
            Version::from_str("2020.12.18").unwrap(),
        );
        assert_eq!(filename.to_string(), "repo_helper-2020.12.18.tar.gz");
        assert_eq!(filename.top_level_dir(), "repo_helper-2020.12.18");
    }

    #[test]
    fn parse() {
        let filename = SourceDistFilename::from_str("domdf_python_tools-1.5.0a3.tar.gz").unwrap();
        assert_eq!(filename.name.as_str(), "domdf-python-tools");
        assert_eq!(filename.version.to_string(), "1.5.0a3");
        assert_eq!(filename.to_string(), "domdf_python_tools-1.5.0a3.tar.gz");
    }

    #[test]
    fn errors() {
        assert_snapshot!(
            SourceDistFilename::from_str("foo-1.0.zip").unwrap_err(),
            @"Failed to parse source distribution filename foo-1.0.zip: File extension is invalid, expected `.tar.gz`"
        );
        assert_snapshot!(
            SourceDistFilename::from_str("foo.tar.gz").unwrap_err(),
            @"Failed to parse source distribution filename foo.tar.gz: Expected `<name>-<version>`"
        );
        assert_snapshot!(
            SourceDistFilename::from_str("foo-one.tar.gz").unwrap_err(),
            @"Failed to parse source distribution filename foo-one.tar.gz: Version section is invalid"
        );
    }
}
