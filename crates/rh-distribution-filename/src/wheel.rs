use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use rh_normalize::{InvalidNameError, PackageName};
use rh_pep440::{Version, VersionParseError};

/// The filename of a wheel, e.g. `repo_helper-2020.12.18-py3-none-any.whl`.
///
/// Built wheels are always pure Python (`py3-none-any`), but any well-formed name is parsed.
///
/// See: <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention>
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    build_tag: Option<String>,
    /// Python, ABI and platform tag, in that order.
    tags: [String; 3],
}

impl WheelFilename {
    /// The filename of a pure Python wheel (`py3-none-any`).
    pub fn new(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version,
            build_tag: None,
            tags: ["py3".to_string(), "none".to_string(), "any".to_string()],
        }
    }

    /// The filename without the `.whl` extension, e.g. `foo-1.2.3-py3-none-any`.
    pub fn stem(&self) -> String {
        let name = self.name.as_dist_info_name();
        match &self.build_tag {
            Some(build_tag) => format!("{name}-{}-{build_tag}-{}", self.version, self.tag()),
            None => format!("{name}-{}-{}", self.version, self.tag()),
        }
    }

    /// The compressed tag set, e.g. `py3-none-any`, as written to the `WHEEL` file.
    pub fn tag(&self) -> String {
        self.tags.join("-")
    }

    /// The name of the `.dist-info` directory inside the wheel.
    pub fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.name.as_dist_info_name(), self.version)
    }

    pub fn build_tag(&self) -> Option<&str> {
        self.build_tag.as_deref()
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.whl", self.stem())
    }
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            WheelFilenameError::InvalidWheelFileName(filename.to_string(), reason.to_string())
        };

        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| invalid("Must end with .whl"))?;

        // `{name}-{version}(-{build})?-{python}-{abi}-{platform}`
        let parts: Vec<&str> = stem.split('-').collect();
        let (name, version, build_tag, tags) = match parts.as_slice() {
            [name, version, python, abi, platform] => {
                (*name, *version, None, [*python, *abi, *platform])
            }
            [name, version, build, python, abi, platform] => {
                (*name, *version, Some(*build), [*python, *abi, *platform])
            }
            [_] => return Err(invalid("Must have a version")),
            [_, _] => return Err(invalid("Must have a Python tag")),
            [_, _, _] => return Err(invalid("Must have an ABI tag")),
            [_, _, _, _] => return Err(invalid("Must have a platform tag")),
            _ => return Err(invalid("Must have 5 or 6 components, but has more")),
        };

        let name = PackageName::from_str(name)
            .map_err(|err| WheelFilenameError::InvalidPackageName(filename.to_string(), err))?;
        let version = Version::from_str(version)
            .map_err(|err| WheelFilenameError::InvalidVersion(filename.to_string(), err))?;
        if let Some(build_tag) =
            build_tag.filter(|tag| !tag.starts_with(|c: char| c.is_ascii_digit()))
        {
            return Err(WheelFilenameError::InvalidBuildTag(
                filename.to_string(),
                build_tag.to_string(),
            ));
        }
        let kinds = ["a language", "an ABI", "a platform"];
        if let Some(position) = tags.iter().position(|tag| tag.is_empty()) {
            return Err(WheelFilenameError::MissingTag(
                filename.to_string(),
                kinds[position],
            ));
        }

        Ok(Self {
            name,
            version,
            build_tag: build_tag.map(ToString::to_string),
            tags: tags.map(ToString::to_string),
        })
    }
}

#[derive(Error, Debug)]
pub enum WheelFilenameError {
    #[error("The wheel filename \"{0}\" is invalid: {1}")]
    InvalidWheelFileName(String, String),
    #[error("The wheel filename \"{0}\" has an invalid version: {1}")]
    InvalidVersion(String, VersionParseError),
    #[error("The wheel filename \"{0}\" has an invalid package name")]
    InvalidPackageName(String, #[source] InvalidNameError),
    #[error("The wheel filename \"{0}\" has an invalid build tag (must start with a digit): {1}")]
    InvalidBuildTag(String, String),
    #[error("The wheel filename \"{0}\" is missing {1} tag")]
    MissingTag(String, &'static str),
}
