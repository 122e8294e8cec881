use std::path::Path;

use indoc::indoc;
use insta::assert_snapshot;
use tempfile::TempDir;

use super::*;

const MINIMAL: &str = indoc! {r"
    modname: repo_helper
    copyright_years: 2020
    author: Dominic Davis-Foster
    email: dominic@davis-foster.co.uk
    username: domdfcoding
    version: 2020.12.18
    license: LGPLv3+
    short_desc: Update multiple configuration files, build scripts etc. from a single location.
"};

fn load(extra: &str, root: &Path) -> Result<PackageConfig, ConfigError> {
    PackageConfig::from_yaml(&format!("{MINIMAL}{extra}"), root)
}

#[test]
fn defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load("", temp_dir.path()).unwrap();
    assert_eq!(config.repo_name, "repo_helper");
    assert_eq!(config.pypi_name, "repo_helper");
    assert_eq!(config.name.as_str(), "repo-helper");
    assert_eq!(config.import_name, "repo_helper");
    assert_eq!(config.version.to_string(), "2020.12.18");
    assert_eq!(config.platforms, ["Windows", "macOS", "Linux"]);
    assert_eq!(config.python_versions, ["3.6"]);
    assert_eq!(config.min_py_version, "3.6");
    assert_eq!(config.requires_python.to_string(), "3.6.1");
    assert_eq!(
        config.docs_url,
        "https://repo_helper.readthedocs.io/en/latest"
    );
    assert_eq!(config.conda_channels, ["domdfcoding"]);
    assert_eq!(config.conda_description, config.short_desc);
    assert!(config.extras_require.is_empty());
    assert!(config.conda_extras.is_empty());
    assert!(config.enable_docs);
    assert_eq!(config.github_url(), "https://github.com/domdfcoding/repo_helper");
    assert_eq!(config.pkg_dir(), "repo_helper");
}

#[test]
fn python_versions() {
    let temp_dir = TempDir::new().unwrap();
    let config = load(
        indoc! {r#"
            python_deploy_version: 3.6
            python_versions: ["3.10-dev", 3.9, pypy3, 3.7, "3.10"]
        "#},
        temp_dir.path(),
    )
    .unwrap();
    assert_eq!(config.python_versions, ["3.7", "3.9", "3.10", "3.10-dev", "pypy3"]);
    assert_eq!(config.min_py_version, "3.7");
    assert_eq!(config.requires_python.to_string(), "3.7");
    assert_eq!(config.python_deploy_version, "3.7");

    let config = load("requires_python: 3.6.2\n", temp_dir.path()).unwrap();
    assert_eq!(config.requires_python.to_string(), "3.6.2");
}

#[test]
fn extras() {
    let temp_dir = TempDir::new().unwrap();
    fs_err::write(
        temp_dir.path().join("docs-requirements.txt"),
        "# Documentation\nsphinx>=3.0.3\nsphinx-toolbox>=1.7.1\n",
    )
    .unwrap();
    let config = load(
        indoc! {r"
            extras_require:
              Testing: [pytest >=6.0.0, coverage]
              docs: docs-requirements.txt
              cli: click>=7.1.2
            conda_extras: [docs]
        "},
        temp_dir.path(),
    )
    .unwrap();

    let rendered = config
        .extras_require
        .iter()
        .map(|(extra, requirements)| format!("{extra}: {}", requirements.join(" | ")))
        .join("\n");
    assert_snapshot!(rendered, @r"
    testing: pytest >=6.0.0 | coverage
    docs: sphinx>=3.0.3 | sphinx-toolbox>=1.7.1
    cli: click>=7.1.2
    all: click>=7.1.2 | coverage | pytest>=6.0.0 | sphinx-toolbox>=1.7.1 | sphinx>=3.0.3
    ");
    assert_eq!(config.additional_requirements_files, ["docs-requirements.txt"]);
    assert_eq!(
        config.conda_extras,
        [ExtraName::from_str("docs").unwrap()]
    );
}

#[test]
fn conda_extras_keywords() {
    let temp_dir = TempDir::new().unwrap();
    let extras = "extras_require:\n  a: [foo]\n  b: [bar]\n";

    let config = load(extras, temp_dir.path()).unwrap();
    assert_eq!(config.conda_extras, [ExtraName::from_str("all").unwrap()]);

    let config = load(&format!("{extras}conda_extras: [none]\n"), temp_dir.path()).unwrap();
    assert!(config.conda_extras.is_empty());

    let err = load(&format!("{extras}conda_extras: [all, none]\n"), temp_dir.path()).unwrap_err();
    assert_snapshot!(err, @"Invalid `conda_extras`: 'all' and 'none' are mutually exclusive");

    let err = load(&format!("{extras}conda_extras: [all, a]\n"), temp_dir.path()).unwrap_err();
    assert_snapshot!(err, @"Invalid `conda_extras`: 'all' cannot be used alongside other values");

    let err = load(&format!("{extras}conda_extras: [c]\n"), temp_dir.path()).unwrap_err();
    assert_snapshot!(err, @"`conda_extras` refers to `c`, which is not declared in `extras_require`");
}

#[test]
fn classifiers_sorted_and_typed() {
    let temp_dir = TempDir::new().unwrap();
    let package = temp_dir.path().join("src").join("repo_helper");
    fs_err::create_dir_all(&package).unwrap();
    fs_err::write(package.join("py.typed"), "").unwrap();

    let config = load(
        indoc! {r"
            source_dir: src
            classifiers:
              - 'Programming Language :: Python :: 3.10'
              - 'Programming Language :: Python :: 3.9'
              - 'Development Status :: 4 - Beta'
              - 'Programming Language :: Python :: 3.9'
        "},
        temp_dir.path(),
    )
    .unwrap();
    assert_eq!(
        config.classifiers,
        [
            "Development Status :: 4 - Beta",
            "Programming Language :: Python :: 3.9",
            "Programming Language :: Python :: 3.10",
            "Typing :: Typed",
        ]
    );
    assert_eq!(config.pkg_dir(), "src/repo_helper");
}

#[test]
fn conda_channels_include_primary() {
    let temp_dir = TempDir::new().unwrap();
    let config = load(
        "conda_channels: [conda-forge, domdfcoding]\nprimary_conda_channel: domdfcoding\n",
        temp_dir.path(),
    )
    .unwrap();
    assert_eq!(config.conda_channels, ["conda-forge", "domdfcoding"]);
}

#[test]
fn import_names() {
    assert_eq!(validate_import_name("my-package/sub", false).unwrap(), "my_package.sub");
    assert_eq!(validate_import_name("foo-stubs", true).unwrap(), "foo");
    assert_snapshot!(
        validate_import_name("1foo", false).unwrap_err(),
        @"Invalid `import_name` `1foo`: every dotted part must be a Python identifier"
    );
    assert!(validate_import_name("", false).is_err());
    assert!(validate_import_name("foo..bar", false).is_err());

    let temp_dir = TempDir::new().unwrap();
    let config = load("stubs_package: true\nimport_name: typing-stubs\n", temp_dir.path()).unwrap();
    assert_eq!(config.import_name, "typing");
    assert_eq!(config.top_level_name(), "typing-stubs");
}

#[test]
fn errors() {
    let temp_dir = TempDir::new().unwrap();
    let err = PackageConfig::from_yaml("modname: foo\n", temp_dir.path()).unwrap_err();
    assert_snapshot!(err, @"Missing required configuration key `author`");

    let contents = MINIMAL.replace("2020.12.18", "not-a-version");
    let err = PackageConfig::from_yaml(&contents, temp_dir.path()).unwrap_err();
    assert_snapshot!(err, @"Invalid version `not-a-version`");

    let err = PackageConfig::from_yaml("modname: [foo", temp_dir.path()).unwrap_err();
    assert!(err.to_string().starts_with("Invalid configuration file: "));
}

#[test]
fn find_repository_walks_up() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("repo");
    let nested = root.join("repo_helper").join("templates");
    fs_err::create_dir_all(&nested).unwrap();
    fs_err::write(root.join("git_helper.yml"), MINIMAL).unwrap();

    let found = find_repository(&nested).unwrap();
    assert_eq!(found, std::path::absolute(&root).unwrap());

    let config = PackageConfig::from_repository(&found).unwrap();
    assert_eq!(config.modname, "repo_helper");

    let err = find_repository(temp_dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}
