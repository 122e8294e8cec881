//! Loading `repo_helper.yml` into a validated [`PackageConfig`].

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

use rh_fs::Simplified;
use rh_normalize::{ExtraName, InvalidNameError, PackageName};
use rh_pep440::{Version, VersionParseError};
use rh_requirements::{RequirementsError, read_requirements};

use crate::natural::natural_cmp;
use crate::raw::{ExtraRequirements, RawConfig, Scalar};

mod natural;
mod raw;

/// The configuration file names, current name first.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["repo_helper.yml", "git_helper.yml"];

/// Environment variables read while building.
pub struct EnvVars;

impl EnvVars {
    /// Seconds since the Unix epoch used for timestamps in built archives.
    ///
    /// See <https://reproducible-builds.org/specs/source-date-epoch/>.
    pub const SOURCE_DATE_EPOCH: &'static str = "SOURCE_DATE_EPOCH";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(
        "No `repo_helper.yml` found in {} or any of its parent directories",
        _0.user_display()
    )]
    NotFound(PathBuf),
    #[error("Invalid configuration file: {}", path.user_display())]
    Yaml {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
    #[error("Missing required configuration key `{0}`")]
    Missing(&'static str),
    #[error("Invalid version `{0}`")]
    Version(String, #[source] VersionParseError),
    #[error("Invalid `requires_python` `{0}`")]
    RequiresPython(String, #[source] VersionParseError),
    #[error("Invalid `{0}`")]
    InvalidName(&'static str, #[source] InvalidNameError),
    #[error("Invalid `import_name` `{0}`: every dotted part must be a Python identifier")]
    InvalidImportName(String),
    #[error("Invalid `conda_extras`: {0}")]
    CondaExtras(&'static str),
    #[error("`conda_extras` refers to `{0}`, which is not declared in `extras_require`")]
    UnknownCondaExtra(String),
    #[error("Failed to read the requirements for extra `{0}`")]
    ExtraRequirements(String, #[source] RequirementsError),
    #[error("Invalid `{}`: `{value}` is not a number of seconds", EnvVars::SOURCE_DATE_EPOCH)]
    SourceDateEpoch { value: String },
}

/// The validated package configuration, with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub modname: String,
    pub repo_name: String,
    /// The distribution name as written, used for the `Name` metadata field.
    pub pypi_name: String,
    /// The normalized distribution name, used in filenames.
    pub name: PackageName,
    /// The dotted import path, e.g. `repo_helper.build`. Never empty.
    pub import_name: String,
    pub version: Version,
    pub author: String,
    pub email: String,
    pub username: String,
    pub license: String,
    pub short_desc: String,
    pub keywords: Vec<String>,
    pub platforms: Vec<String>,
    /// Sorted and de-duplicated.
    pub classifiers: Vec<String>,
    /// The directory containing the package, relative to the repository root (empty for the
    /// root itself).
    pub source_dir: String,
    pub stubs_package: bool,

    pub manifest_additional: Vec<String>,
    pub console_scripts: Vec<String>,
    pub entry_points: IndexMap<String, Vec<String>>,
    /// Requirement strings per extra, in declaration order, with a synthesized `all` extra last.
    pub extras_require: IndexMap<ExtraName, Vec<String>>,
    pub additional_requirements_files: Vec<String>,

    pub python_deploy_version: String,
    pub python_versions: Vec<String>,
    pub min_py_version: String,
    pub requires_python: Version,

    pub enable_docs: bool,
    pub docs_url: String,

    pub enable_conda: bool,
    /// Sorted and de-duplicated, including the primary channel.
    pub conda_channels: Vec<String>,
    pub primary_conda_channel: String,
    pub conda_description: String,
    /// The extras whose requirements become Conda dependencies.
    pub conda_extras: Vec<ExtraName>,
}

/// Walk up from `start` until a directory containing a configuration file is found.
pub fn find_repository(start: &Path) -> Result<PathBuf, ConfigError> {
    let start = std::path::absolute(start)?;
    rh_fs::find_upwards(&start, &CONFIG_FILE_NAMES).ok_or(ConfigError::NotFound(start))
}

/// Read [`EnvVars::SOURCE_DATE_EPOCH`], if set.
pub fn source_date_epoch() -> Result<Option<u64>, ConfigError> {
    let Some(value) = std::env::var_os(EnvVars::SOURCE_DATE_EPOCH) else {
        return Ok(None);
    };
    let value = value.to_string_lossy();
    value
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::SourceDateEpoch {
            value: value.to_string(),
        })
}

impl PackageConfig {
    /// Load the configuration of the repository at `root`.
    ///
    /// `repo_helper.yml` takes precedence over the legacy `git_helper.yml`.
    pub fn from_repository(root: &Path) -> Result<Self, ConfigError> {
        let path = CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ConfigError::NotFound(root.to_path_buf()))?;
        debug!("Reading configuration from: {}", path.user_display());
        let contents = fs_err::read_to_string(&path)?;
        let raw: RawConfig = serde_yaml::from_str(&contents)
            .map_err(|err| ConfigError::Yaml { path, err })?;
        Self::from_raw(raw, root)
    }

    /// Parse and validate the contents of a configuration file for the repository at `root`.
    pub fn from_yaml(contents: &str, root: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|err| ConfigError::Yaml {
            path: root.join(CONFIG_FILE_NAMES[0]),
            err,
        })?;
        Self::from_raw(raw, root)
    }

    fn from_raw(raw: RawConfig, root: &Path) -> Result<Self, ConfigError> {
        let modname = raw.modname.ok_or(ConfigError::Missing("modname"))?;
        let author = raw.author.ok_or(ConfigError::Missing("author"))?;
        let email = raw.email.ok_or(ConfigError::Missing("email"))?;
        let username = raw.username.ok_or(ConfigError::Missing("username"))?;
        let license = raw.license.ok_or(ConfigError::Missing("license"))?;
        let short_desc = raw.short_desc.ok_or(ConfigError::Missing("short_desc"))?;
        let Scalar(version) = raw.version.ok_or(ConfigError::Missing("version"))?;
        let version =
            Version::from_str(&version).map_err(|err| ConfigError::Version(version, err))?;

        let repo_name = raw.repo_name.unwrap_or_else(|| modname.clone());
        let pypi_name = raw.pypi_name.unwrap_or_else(|| modname.clone());
        let name = PackageName::from_str(&pypi_name)
            .map_err(|err| ConfigError::InvalidName("pypi_name", err))?;
        let import_name = validate_import_name(
            raw.import_name.as_deref().unwrap_or(&modname),
            raw.stubs_package,
        )?;

        let extras_require = parse_extras(raw.extras_require, root)?;
        let mut additional_requirements_files = raw.additional_requirements_files;
        for requirements in extras_require.values() {
            if let ExtrasOrigin::File(file) = &requirements.origin {
                if !additional_requirements_files.contains(file) {
                    additional_requirements_files.push(file.clone());
                }
            }
        }
        let all = ExtraName::from_str("all")
            .map_err(|err| ConfigError::InvalidName("extras_require", err))?;
        let extras_require = with_all_extra(
            all,
            extras_require
                .into_iter()
                .map(|(extra, requirements)| (extra, requirements.requirements))
                .collect(),
        );
        let conda_extras = validate_conda_extras(raw.conda_extras, &extras_require)?;

        let python_deploy_version = raw
            .python_deploy_version
            .map_or_else(|| "3.6".to_string(), |Scalar(version)| version);
        let python_versions: Vec<String> = raw
            .python_versions
            .map(|versions| {
                versions
                    .into_iter()
                    .map(|Scalar(version)| version)
                    .filter(|version| !version.is_empty())
                    .sorted_by(|a, b| natural_cmp(a, b))
                    .collect()
            })
            .unwrap_or_else(|| vec![python_deploy_version.clone()]);
        let min_py_version = min_py_version(&python_versions)
            .unwrap_or(python_deploy_version.as_str())
            .to_string();
        let python_deploy_version = match (
            Version::from_str(&python_deploy_version),
            Version::from_str(&min_py_version),
        ) {
            (Ok(deploy), Ok(min)) if deploy < min => min_py_version.clone(),
            _ => python_deploy_version,
        };
        let requires_python = match raw.requires_python {
            Some(Scalar(requires_python)) => requires_python,
            None if min_py_version == "3.6" => "3.6.1".to_string(),
            None => min_py_version.clone(),
        };
        let requires_python = Version::from_str(&requires_python)
            .map_err(|err| ConfigError::RequiresPython(requires_python, err))?;

        let mut classifiers = raw.classifiers;
        let py_typed = root
            .join(&raw.source_dir)
            .join(import_name.replace('.', "/"))
            .join("py.typed");
        if py_typed.is_file() {
            debug!("Found {}, adding `Typing :: Typed`", py_typed.user_display());
            classifiers.push("Typing :: Typed".to_string());
        }
        let classifiers = classifiers
            .into_iter()
            .unique()
            .sorted_by(|a, b| natural_cmp(a, b))
            .collect();

        let docs_url = raw.docs_url.unwrap_or_else(|| {
            format!(
                "https://{}.readthedocs.io/en/latest",
                repo_name.to_lowercase()
            )
        });

        let primary_conda_channel = raw
            .primary_conda_channel
            .unwrap_or_else(|| username.clone());
        let conda_channels = raw
            .conda_channels
            .into_iter()
            .chain(std::iter::once(primary_conda_channel.clone()))
            .sorted()
            .dedup()
            .collect();
        let conda_description = raw
            .conda_description
            .unwrap_or_else(|| short_desc.clone());

        Ok(Self {
            modname,
            repo_name,
            pypi_name,
            name,
            import_name,
            version,
            author,
            email,
            username,
            license,
            short_desc,
            keywords: raw.keywords,
            platforms: raw.platforms.unwrap_or_else(|| {
                vec!["Windows".to_string(), "macOS".to_string(), "Linux".to_string()]
            }),
            classifiers,
            source_dir: raw.source_dir,
            stubs_package: raw.stubs_package,
            manifest_additional: raw.manifest_additional,
            console_scripts: raw.console_scripts,
            entry_points: raw.entry_points,
            extras_require,
            additional_requirements_files,
            python_deploy_version,
            python_versions,
            min_py_version,
            requires_python,
            enable_docs: raw.enable_docs.unwrap_or(true),
            docs_url,
            enable_conda: raw.enable_conda.unwrap_or(true),
            conda_channels,
            primary_conda_channel,
            conda_description,
            conda_extras,
        })
    }

    /// The GitHub URL of the repository, used as the home page.
    pub fn github_url(&self) -> String {
        format!("https://github.com/{}/{}", self.username, self.repo_name)
    }

    /// The first segment of the import name, with `-stubs` appended for stubs packages.
    pub fn top_level_name(&self) -> String {
        let first = self
            .import_name
            .split('.')
            .next()
            .unwrap_or(&self.import_name);
        if self.stubs_package {
            format!("{first}-stubs")
        } else {
            first.to_string()
        }
    }

    /// The package directory relative to the repository root, in portable form, e.g.
    /// `src/repo_helper`.
    pub fn pkg_dir(&self) -> String {
        if self.source_dir.is_empty() {
            self.top_level_name()
        } else {
            format!(
                "{}/{}",
                self.source_dir.trim_end_matches('/'),
                self.top_level_name()
            )
        }
    }
}

/// Apply the `import_name` spelling rules: `-` becomes `_`, `/` becomes `.`, and for stubs
/// packages a trailing `-stubs` is dropped.
fn validate_import_name(import_name: &str, stubs_package: bool) -> Result<String, ConfigError> {
    let import_name = if stubs_package {
        import_name.strip_suffix("-stubs").unwrap_or(import_name)
    } else {
        import_name
    };
    let import_name = import_name.replace('-', "_").replace('/', ".");
    let is_identifier = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    };
    if import_name.split('.').all(is_identifier) {
        Ok(import_name)
    } else {
        Err(ConfigError::InvalidImportName(import_name))
    }
}

enum ExtrasOrigin {
    Inline,
    /// Read from a requirements file, relative to the repository root.
    File(String),
}

struct ExtraRequirementStrings {
    requirements: Vec<String>,
    origin: ExtrasOrigin,
}

/// Resolve each `extras_require` value into requirement strings.
///
/// A single string naming an existing file is read as a requirements file, any other single
/// string is a requirement.
fn parse_extras(
    extras_require: IndexMap<String, ExtraRequirements>,
    root: &Path,
) -> Result<IndexMap<ExtraName, ExtraRequirementStrings>, ConfigError> {
    let mut parsed = IndexMap::new();
    for (extra, requires) in extras_require {
        let extra_name = ExtraName::from_str(&extra)
            .map_err(|err| ConfigError::InvalidName("extras_require", err))?;
        let requirements = match requires {
            ExtraRequirements::List(requirements) => ExtraRequirementStrings {
                requirements,
                origin: ExtrasOrigin::Inline,
            },
            ExtraRequirements::Single(value) if root.join(&value).is_file() => {
                let file = read_requirements(root.join(&value))
                    .map_err(|err| ConfigError::ExtraRequirements(extra.clone(), err))?;
                ExtraRequirementStrings {
                    requirements: file
                        .requirements
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    origin: ExtrasOrigin::File(value),
                }
            }
            ExtraRequirements::Single(requirement) => ExtraRequirementStrings {
                requirements: vec![requirement],
                origin: ExtrasOrigin::Inline,
            },
        };
        parsed.insert(extra_name, requirements);
    }
    Ok(parsed)
}

/// Add the `all` extra, the sorted union of every other extra, when any extra is declared.
fn with_all_extra(
    all: ExtraName,
    mut extras_require: IndexMap<ExtraName, Vec<String>>,
) -> IndexMap<ExtraName, Vec<String>> {
    extras_require.shift_remove(&all);
    if extras_require.is_empty() {
        return extras_require;
    }
    let union = extras_require
        .values()
        .flatten()
        .map(|requirement| requirement.replace(' ', ""))
        .sorted()
        .dedup()
        .collect();
    extras_require.insert(all, union);
    extras_require
}

/// `all` and `none` are keywords which can't be combined with anything else.
fn validate_conda_extras(
    conda_extras: Option<Vec<String>>,
    extras_require: &IndexMap<ExtraName, Vec<String>>,
) -> Result<Vec<ExtraName>, ConfigError> {
    let conda_extras: Vec<String> = conda_extras
        .unwrap_or_else(|| vec!["all".to_string()])
        .into_iter()
        .filter(|extra| !extra.is_empty())
        .collect();

    let has_all = conda_extras.iter().any(|extra| extra == "all");
    let has_none = conda_extras.iter().any(|extra| extra == "none");
    if has_all && has_none {
        return Err(ConfigError::CondaExtras("'all' and 'none' are mutually exclusive"));
    }
    if has_all && conda_extras.len() > 1 {
        return Err(ConfigError::CondaExtras(
            "'all' cannot be used alongside other values",
        ));
    }
    if has_none {
        if conda_extras.len() > 1 {
            return Err(ConfigError::CondaExtras(
                "'none' cannot be used alongside other values",
            ));
        }
        return Ok(Vec::new());
    }

    let mut validated = Vec::new();
    for extra in conda_extras {
        let extra_name = ExtraName::from_str(&extra)
            .map_err(|err| ConfigError::InvalidName("conda_extras", err))?;
        if extras_require.contains_key(&extra_name) {
            validated.push(extra_name);
        } else if extra != "all" {
            // `all` only exists when some extra is declared.
            return Err(ConfigError::UnknownCondaExtra(extra));
        }
    }
    Ok(validated)
}

/// The smallest version that parses, ignoring `-dev` versions.
fn min_py_version(python_versions: &[String]) -> Option<&str> {
    let non_dev = || {
        python_versions
            .iter()
            .filter(|version| !version.ends_with("-dev"))
    };
    non_dev()
        .filter_map(|version| {
            Version::from_str(version)
                .ok()
                .map(|parsed| (parsed, version.as_str()))
        })
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, version)| version)
        .or_else(|| non_dev().next().map(String::as_str))
}

#[cfg(test)]
mod tests;
