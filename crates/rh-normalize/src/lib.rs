//! Normalized package and extra names.
//!
//! Names are compared after lowercasing them and collapsing every run of `-`, `_` and `.` into a
//! single `-`, so `My.Package_Name` and `my-package-name` refer to the same distribution.
//!
//! See <https://packaging.python.org/en/latest/specifications/name-normalization/>.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.')
}

/// Lowercase `name` and join its separator-delimited parts with a single `-`.
///
/// A name consists of ASCII letters, digits and separators, and starts and ends with a letter or
/// digit.
pub(crate) fn normalize(name: &str) -> Result<String, InvalidNameError> {
    let invalid = || InvalidNameError(name.to_string());

    let first = name.chars().next().ok_or_else(invalid)?;
    let last = name.chars().next_back().ok_or_else(invalid)?;
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid());
    }

    let mut normalized = String::with_capacity(name.len());
    for part in name.split(is_separator).filter(|part| !part.is_empty()) {
        if !part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        if !normalized.is_empty() {
            normalized.push('-');
        }
        normalized.extend(part.chars().map(|c| c.to_ascii_lowercase()));
    }
    Ok(normalized)
}

/// Defines a string newtype that can only hold a normalized name.
macro_rules! normalized_name {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// The normalized name.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::InvalidNameError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                $crate::normalize(name).map(Self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

pub(crate) use normalized_name;

/// A string that is neither a valid [`PackageName`] nor a valid [`ExtraName`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// The rejected name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid name `{}`: names consist of ASCII letters, digits, `-`, `_` and `.`, and \
            start and end with a letter or digit",
            self.0
        )
    }
}

impl Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::{ExtraName, PackageName, normalize};

    #[test]
    fn separators_collapse() {
        for input in [
            "repo-helper",
            "Repo-Helper",
            "REPO_HELPER",
            "repo.helper",
            "repo__helper",
            "repo-._.-helper",
            "rEpO--HeLpEr",
        ] {
            assert_eq!(normalize(input).unwrap(), "repo-helper", "{input:?}");
        }
    }

    #[test]
    fn dotted_and_underscored_names_agree() {
        let dotted: PackageName = "My.Package_Name".parse().unwrap();
        let dashed: PackageName = "my-package-name".parse().unwrap();
        assert_eq!(dotted, dashed);
        assert_eq!(dotted.as_str(), "my-package-name");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["My.Package_Name", "a", "A__B", "x.y.z", "Django-REST_framework", "3d"] {
            let once = normalize(input).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "{input:?}");
        }
    }

    #[test]
    fn invalid_names() {
        for input in [
            "",
            "-",
            " leading-space",
            "_leading-underscore",
            "trailing-dot.",
            "trailing-space ",
            "bang!",
            "inner space",
            "ruamel-yαml",
        ] {
            assert!(input.parse::<PackageName>().is_err(), "{input:?}");
            assert!(input.parse::<ExtraName>().is_err(), "{input:?}");
        }
        let err = "ruamel yaml".parse::<PackageName>().unwrap_err();
        assert_snapshot!(err, @"Invalid name `ruamel yaml`: names consist of ASCII letters, digits, `-`, `_` and `.`, and start and end with a letter or digit");
    }

    #[test]
    fn dist_info_name() {
        let name: PackageName = "Domdf.Python_Tools".parse().unwrap();
        assert_eq!(name.as_dist_info_name(), "domdf_python_tools");
        let name: PackageName = "click".parse().unwrap();
        assert_eq!(name.as_dist_info_name(), "click");
    }

    #[test]
    fn deserialize() {
        let extras: Vec<ExtraName> = serde_json::from_str(r#"["Testing", "all.extras"]"#).unwrap();
        assert_eq!(
            extras.iter().map(ExtraName::as_str).collect::<Vec<_>>(),
            ["testing", "all-extras"]
        );
    }
}
