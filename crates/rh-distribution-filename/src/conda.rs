use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use rh_pep440::{Version, VersionParseError};

/// The filename of a `noarch: python` Conda package, e.g. `repo_helper-2020.12.18-py_1.tar.bz2`.
///
/// Conda names are lowercased but otherwise kept as written, so `.` and `_` survive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CondaFilename {
    name: String,
    pub version: Version,
    pub build_number: u64,
}

impl CondaFilename {
    pub fn new(name: &str, version: Version, build_number: u64) -> Self {
        Self {
            name: name.to_lowercase(),
            version,
            build_number,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The build string, e.g. `py_1`.
    pub fn build_string(&self) -> String {
        format!("py_{}", self.build_number)
    }
}

impl Display for CondaFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}.tar.bz2",
            self.name,
            self.version,
            self.build_string()
        )
    }
}

impl FromStr for CondaFilename {
    type Err = CondaFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let err = |kind| CondaFilenameError {
            filename: filename.to_string(),
            kind,
        };

        let stem = filename
            .strip_suffix(".tar.bz2")
            .ok_or_else(|| err(CondaFilenameErrorKind::Extension))?;

        // Names may contain `-`, versions and build strings may not.
        let mut parts = stem.rsplitn(3, '-');
        let (Some(build), Some(version), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(err(CondaFilenameErrorKind::Components));
        };
        if name.is_empty() {
            return Err(err(CondaFilenameErrorKind::Components));
        }
        let build_number = build
            .strip_prefix("py_")
            .and_then(|number| number.parse::<u64>().ok())
            .ok_or_else(|| err(CondaFilenameErrorKind::BuildString(build.to_string())))?;
        let version = Version::from_str(version)
            .map_err(|source| err(CondaFilenameErrorKind::Version(source)))?;

        Ok(Self::new(name, version, build_number))
    }
}

#[derive(Error, Debug, Clone)]
#[error("Failed to parse Conda package filename {filename}: {kind}")]
pub struct CondaFilenameError {
    filename: String,
    kind: CondaFilenameErrorKind,
}

#[derive(Error, Debug, Clone)]
enum CondaFilenameErrorKind {
    #[error("File extension is invalid, expected `.tar.bz2`")]
    Extension,
    #[error("Expected `<name>-<version>-<build>`")]
    Components,
    #[error("Build string `{0}` is not of the form `py_<number>`")]
    BuildString(String),
    #[error("Version section is invalid")]
    Version(#[source] VersionParseError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;

    use rh_pep440::Version;

    use super::CondaFilename;

    #[test]
    fn display() {
        let filename = CondaFilename::new("Repo_Helper", Version::from_str("2020.12.18").unwrap(), 1);
        assert_eq!(filename.to_string(), "repo_helper-2020.12.18-py_1.tar.bz2");
        assert_eq!(filename.build_string(), "py_1");
    }

    #[test]
    fn parse() {
        let filename = CondaFilename::from_str("ruamel.yaml-0.16.12-py_3.tar.bz2").unwrap();
        assert_eq!(filename.name(), "ruamel.yaml");
        assert_eq!(filename.version.to_string(), "0.16.12");
        assert_eq!(filename.build_number, 3);

        let filename = CondaFilename::from_str("sphinx-toolbox-1.0.0-py_0.tar.bz2").unwrap();
        assert_eq!(filename.name(), "sphinx-toolbox");
    }

    #[test]
    fn errors() {
        assert_snapshot!(
            CondaFilename::from_str("foo-1.0-py_1.tar.gz").unwrap_err(),
            @"Failed to parse Conda package filename foo-1.0-py_1.tar.gz: File extension is invalid, expected `.tar.bz2`"
        );
        assert_snapshot!(
            CondaFilename::from_str("foo-1.0.tar.bz2").unwrap_err(),
            @"Failed to parse Conda package filename foo-1.0.tar.bz2: Expected `<name>-<version>-<build>`"
        );
        assert_snapshot!(
            CondaFilename::from_str("foo-1.0-h123_0.tar.bz2").unwrap_err(),
            @"Failed to parse Conda package filename foo-1.0-h123_0.tar.bz2: Build string `h123_0` is not of the form `py_<number>`"
        );
    }
}
