//! Core metadata for `METADATA` and `PKG-INFO`.
//!
//! See <https://packaging.python.org/en/latest/specifications/core-metadata/>.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use tracing::debug;

use rh_configuration::PackageConfig;
use rh_normalize::ExtraName;
use rh_pep508::{MarkerTree, Requirement};
use rh_requirements::{combine_requirements, read_requirements};
use rh_warnings::warn_user_once;

use crate::Error;

/// An ordered list of metadata fields, where a field may repeat, plus the long description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    fields: Vec<(&'static str, String)>,
    description: Option<String>,
}

impl CoreMetadata {
    /// Append a field, keeping any earlier values of the same field.
    pub fn push(&mut self, key: &'static str, value: impl Display) {
        self.fields.push((key, value.to_string()));
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// The first value of a field.
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    /// All values of a field, in order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |(field, _)| field.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize in the email-header format, followed by the description after a blank line.
    pub fn core_metadata_format(&self) -> String {
        let mut writer = String::new();
        for (key, value) in &self.fields {
            let mut lines = value.lines();
            writer.push_str(&format!("{key}: {}\n", lines.next().unwrap_or_default()));
            for line in lines {
                writer.push_str(&format!("{}{}\n", " ".repeat(key.len() + 2), line));
            }
        }
        if let Some(description) = &self.description {
            writer.push('\n');
            writer.push_str(description);
            if !description.ends_with('\n') {
                writer.push('\n');
            }
        }
        writer
    }
}

/// Build the metadata of the package from its configuration, `requirements.txt` and
/// `README.rst`.
pub fn compose(config: &PackageConfig, repo_dir: &Path) -> Result<CoreMetadata, Error> {
    let home_page = config.github_url();

    let mut metadata = CoreMetadata::default();
    metadata.push("Metadata-Version", "2.1");
    metadata.push("Name", &config.pypi_name);
    metadata.push("Version", &config.version);
    metadata.push("Summary", &config.short_desc);
    metadata.push("Home-page", &home_page);
    metadata.push("Author", &config.author);
    metadata.push("Author-email", &config.email);
    metadata.push("License", &config.license);
    if !config.keywords.is_empty() {
        metadata.push("Keywords", config.keywords.join(","));
    }
    if config.enable_docs {
        metadata.push("Project-URL", format!("Documentation, {}", config.docs_url));
    }
    metadata.push("Project-URL", format!("Issue Tracker, {home_page}/issues"));
    metadata.push("Project-URL", format!("Source Code, {home_page}"));
    for platform in &config.platforms {
        metadata.push("Platform", platform);
    }
    for classifier in &config.classifiers {
        metadata.push("Classifier", classifier);
    }
    metadata.push("Requires-Python", format!(">={}", config.requires_python));
    metadata.push("Description-Content-Type", "text/x-rst");

    for requirement in distributable(runtime_requirements(repo_dir)?) {
        metadata.push("Requires-Dist", requirement);
    }
    for (extra, requirements) in &config.extras_require {
        metadata.push("Provides-Extra", extra);
        let requirements = combine_requirements(parse_extra(extra, requirements)?);
        for mut requirement in distributable(requirements) {
            let marker = MarkerTree::extra(extra);
            requirement.marker = Some(match requirement.marker.take() {
                Some(existing) => existing.and(marker),
                None => marker,
            });
            metadata.push("Requires-Dist", requirement);
        }
    }

    let readme = fs_err::read_to_string(repo_dir.join("README.rst"))?;
    metadata.set_description(readme);

    Ok(metadata)
}

/// The merged requirements of `requirements.txt`, which every repository must have.
pub(crate) fn runtime_requirements(repo_dir: &Path) -> Result<Vec<Requirement>, Error> {
    let file = read_requirements(repo_dir.join("requirements.txt"))?;
    debug!("Merging {} runtime requirement(s)", file.requirements.len());
    Ok(combine_requirements(file.requirements))
}

/// Parse the requirement strings of an extra from the configuration.
pub(crate) fn parse_extra(
    extra: &ExtraName,
    requirements: &[String],
) -> Result<Vec<Requirement>, Error> {
    requirements
        .iter()
        .map(|requirement| {
            Requirement::from_str(requirement).map_err(|err| Error::Requirement {
                extra: extra.clone(),
                requirement: requirement.clone(),
                err: Box::new(err),
            })
        })
        .collect()
}

/// Drop direct URL requirements, which can't be published to an index, and sort the rest by
/// name.
fn distributable(requirements: Vec<Requirement>) -> Vec<Requirement> {
    requirements
        .into_iter()
        .filter(|requirement| {
            if requirement.url().is_some() {
                warn_user_once!(
                    "Skipping direct URL requirement `{requirement}`, it can't be expressed in the package metadata"
                );
                false
            } else {
                true
            }
        })
        .sorted_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.to_string().cmp(&b.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use indoc::indoc;
    use insta::assert_snapshot;
    use tempfile::TempDir;

    use rh_configuration::PackageConfig;
    use rh_requirements::RequirementsError;

    use super::{CoreMetadata, compose};
    use crate::Error;

    fn config(extra: &str, root: &Path) -> PackageConfig {
        let yaml = indoc! {r"
            modname: repo_helper
            author: Dominic Davis-Foster
            email: dominic@davis-foster.co.uk
            username: domdfcoding
            version: 2020.12.18
            license: LGPLv3+
            short_desc: Update multiple configuration files, build scripts etc. from a single location.
            python_versions: [3.6, 3.7, 3.8]
        "};
        PackageConfig::from_yaml(&format!("{yaml}{extra}"), root).unwrap()
    }

    #[test]
    fn format_continuation_lines() {
        let mut metadata = CoreMetadata::default();
        metadata.push("Name", "foo");
        metadata.push("Summary", "first\nsecond");
        metadata.push("Classifier", "a");
        metadata.push("Classifier", "b");
        metadata.set_description("Readme");
        assert_snapshot!(metadata.core_metadata_format(), @r"
        Name: foo
        Summary: first
                 second
        Classifier: a
        Classifier: b

        Readme
        ");
        assert_eq!(metadata.get_first("classifier"), Some("a"));
        assert_eq!(metadata.get_all("Classifier").count(), 2);
    }

    #[test]
    fn compose_full() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs_err::write(
            root.join("requirements.txt"),
            indoc! {r"
                click>=7.1.2
                # Configuration
                ruamel.yaml>=0.16.12
                jinja2>=2.11.2
                click<8; python_version < '3.7'
                domdf-python-tools @ https://github.com/domdfcoding/domdf_python_tools/archive/master.zip
            "},
        )
        .unwrap();
        fs_err::write(root.join("README.rst"), "repo_helper\n===========\n").unwrap();
        let config = config(
            indoc! {r#"
                keywords: [configuration, packaging]
                classifiers: ["Topic :: Utilities"]
                extras_require:
                  testing: [pytest>=6.0.0, "coverage; python_version >= '3.7'", pytest>=6.1]
            "#},
            root,
        );

        let metadata = compose(&config, root).unwrap();
        assert_snapshot!(metadata.core_metadata_format(), @r#"
        Metadata-Version: 2.1
        Name: repo_helper
        Version: 2020.12.18
        Summary: Update multiple configuration files, build scripts etc. from a single location.
        Home-page: https://github.com/domdfcoding/repo_helper
        Author: Dominic Davis-Foster
        Author-email: dominic@davis-foster.co.uk
        License: LGPLv3+
        Keywords: configuration,packaging
        Project-URL: Documentation, https://repo_helper.readthedocs.io/en/latest
        Project-URL: Issue Tracker, https://github.com/domdfcoding/repo_helper/issues
        Project-URL: Source Code, https://github.com/domdfcoding/repo_helper
        Platform: Windows
        Platform: macOS
        Platform: Linux
        Classifier: Topic :: Utilities
        Requires-Python: >=3.6.1
        Description-Content-Type: text/x-rst
        Requires-Dist: click>=7.1.2,<8
        Requires-Dist: jinja2>=2.11.2
        Requires-Dist: ruamel-yaml>=0.16.12
        Provides-Extra: testing
        Requires-Dist: coverage; python_version >= "3.7" and extra == 'testing'
        Requires-Dist: pytest>=6.1; extra == 'testing'
        Provides-Extra: all
        Requires-Dist: coverage; python_version >= "3.7" and extra == 'all'
        Requires-Dist: pytest>=6.1; extra == 'all'

        repo_helper
        ===========
        "#);
    }

    /// A repository with an empty `requirements.txt` and a one-line `README.rst`.
    fn bare_repo() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs_err::write(temp_dir.path().join("requirements.txt"), "").unwrap();
        fs_err::write(temp_dir.path().join("README.rst"), "Readme\n").unwrap();
        temp_dir
    }

    #[test]
    fn docs_disabled() {
        let temp_dir = bare_repo();
        let config = config("enable_docs: false\n", temp_dir.path());
        let metadata = compose(&config, temp_dir.path()).unwrap();
        assert_eq!(
            metadata.get_all("Project-URL").collect::<Vec<_>>(),
            [
                "Issue Tracker, https://github.com/domdfcoding/repo_helper/issues",
                "Source Code, https://github.com/domdfcoding/repo_helper",
            ]
        );
        assert_eq!(metadata.get_all("Requires-Dist").count(), 0);
        assert!(metadata.core_metadata_format().ends_with("text/x-rst\n\nReadme\n"));
    }

    #[test]
    fn missing_requirements_file() {
        let temp_dir = bare_repo();
        fs_err::remove_file(temp_dir.path().join("requirements.txt")).unwrap();
        let config = config("", temp_dir.path());
        let err = compose(&config, temp_dir.path()).unwrap_err();
        assert!(
            matches!(err, Error::Requirements(RequirementsError::Io { .. })),
            "{err:?}"
        );
    }

    #[test]
    fn missing_readme() {
        let temp_dir = bare_repo();
        fs_err::remove_file(temp_dir.path().join("README.rst")).unwrap();
        let config = config("", temp_dir.path());
        let err = compose(&config, temp_dir.path()).unwrap_err();
        let Error::Io(err) = err else {
            panic!("expected an I/O error, got {err:?}");
        };
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("README.rst"), "{err}");
    }

    #[test]
    fn invalid_extra_requirement() {
        let temp_dir = bare_repo();
        let config = config("extras_require:\n  docs: ['sphinx >= ']\n", temp_dir.path());
        let err = compose(&config, temp_dir.path()).unwrap_err();
        assert_snapshot!(err, @"Invalid requirement `sphinx >= ` in extra `docs`");
    }
}
