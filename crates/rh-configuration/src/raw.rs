//! The `repo_helper.yml` keys as written, before defaults and validation.

use std::fmt::Formatter;

use indexmap::IndexMap;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// The subset of `repo_helper.yml` the build backend reads.
///
/// Keys for the other generated files (tox, CI, documentation theme, ...) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawConfig {
    pub(crate) modname: Option<String>,
    pub(crate) version: Option<Scalar>,
    pub(crate) author: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) license: Option<String>,
    pub(crate) short_desc: Option<String>,

    pub(crate) repo_name: Option<String>,
    pub(crate) pypi_name: Option<String>,
    pub(crate) import_name: Option<String>,
    pub(crate) source_dir: String,
    pub(crate) stubs_package: bool,

    pub(crate) keywords: Vec<String>,
    pub(crate) classifiers: Vec<String>,
    pub(crate) platforms: Option<Vec<String>>,

    pub(crate) manifest_additional: Vec<String>,
    pub(crate) console_scripts: Vec<String>,
    pub(crate) entry_points: IndexMap<String, Vec<String>>,
    pub(crate) extras_require: IndexMap<String, ExtraRequirements>,
    pub(crate) additional_requirements_files: Vec<String>,

    pub(crate) python_deploy_version: Option<Scalar>,
    pub(crate) python_versions: Option<Vec<Scalar>>,
    pub(crate) requires_python: Option<Scalar>,

    pub(crate) enable_docs: Option<bool>,
    pub(crate) docs_url: Option<String>,

    pub(crate) enable_conda: Option<bool>,
    pub(crate) conda_channels: Vec<String>,
    pub(crate) primary_conda_channel: Option<String>,
    pub(crate) conda_description: Option<String>,
    pub(crate) conda_extras: Option<Vec<String>>,
}

/// The value of one `extras_require` entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExtraRequirements {
    List(Vec<String>),
    /// Either a path to a requirements file, relative to the repository root, or a single
    /// requirement.
    Single(String),
}

/// A YAML scalar read as a string.
///
/// Versions are routinely written unquoted (`version: 0.1`, `python_versions: [3.6, 3.7]`), which
/// YAML reads as numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scalar(pub(crate) String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl Visitor<'_> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                f.write_str("a string or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(Scalar(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                // `3.0` stays `3.0` rather than becoming `3`.
                if v.fract() == 0.0 && v.is_finite() {
                    Ok(Scalar(format!("{v:.1}")))
                } else {
                    Ok(Scalar(v.to_string()))
                }
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}
