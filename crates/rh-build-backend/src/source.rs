//! Collecting the files of a distribution into the build directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use rh_fs::Simplified;

use crate::Error;
use crate::build_dir::BuildDirectory;
use crate::glob::GlobPattern;

/// The extensions of Python source files.
const SOURCE_EXTENSIONS: [&str; 3] = ["py", "pyi", "pyx"];

/// The files of the package at `pkg_dir`: Python sources, stubs, Cython sources and `py.typed`
/// markers, in lexical order. Bytecode caches are never entered.
pub fn iter_source_files(pkg_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !pkg_dir.is_dir() {
        return Err(Error::MissingPackageDir(pkg_dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(pkg_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != "__pycache__");
    for entry in walker {
        let entry = entry.map_err(|err| Error::WalkDir {
            root: pkg_dir.to_path_buf(),
            err,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_source = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|extension| SOURCE_EXTENSIONS.contains(&extension));
        if is_source || entry.file_name() == "py.typed" {
            files.push(entry.into_path());
        } else {
            trace!("Skipping non-source file: {}", path.user_display());
        }
    }
    Ok(files)
}

/// One line of `manifest_additional`, in `MANIFEST.in` syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestRule {
    /// `include <pattern>...`: copy matching files from the repository root.
    Include(Vec<String>),
    /// `exclude <pattern>...`: remove matching files from the build directory.
    Exclude(Vec<String>),
    /// `recursive-include <dir> <pattern>...`: copy files matching in any subdirectory of `dir`.
    RecursiveInclude { dir: String, patterns: Vec<String> },
    /// `recursive-exclude <dir> <pattern>...`: remove staged files matching in any subdirectory
    /// of `dir`.
    RecursiveExclude { dir: String, patterns: Vec<String> },
}

impl ManifestRule {
    /// Parse a rule, returning `None` for verbs other than the four supported ones.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let mut patterns = || parts.by_ref().map(ToString::to_string).collect::<Vec<_>>();
        match verb {
            "include" => Some(Self::Include(patterns())),
            "exclude" => Some(Self::Exclude(patterns())),
            "recursive-include" | "recursive-exclude" => {
                let mut patterns = patterns();
                if patterns.is_empty() {
                    return None;
                }
                let dir = patterns.remove(0);
                if verb == "recursive-include" {
                    Some(Self::RecursiveInclude { dir, patterns })
                } else {
                    Some(Self::RecursiveExclude { dir, patterns })
                }
            }
            _ => None,
        }
    }
}

/// Copy the package sources into the build directory, keeping their path relative to the
/// repository.
pub(crate) fn copy_sources(
    repo_dir: &Path,
    pkg_dir: &str,
    build_dir: &mut BuildDirectory,
) -> Result<(), Error> {
    for file in iter_source_files(&repo_dir.join(pkg_dir))? {
        copy_relative(repo_dir, &file, build_dir)?;
    }
    Ok(())
}

/// Apply the `manifest_additional` rules in order, so a later rule can undo an earlier one.
pub(crate) fn copy_manifest_additional(
    lines: &[String],
    repo_dir: &Path,
    build_dir: &mut BuildDirectory,
) -> Result<(), Error> {
    for line in lines {
        let Some(rule) = ManifestRule::parse(line) else {
            debug!("Ignoring unsupported manifest rule: `{line}`");
            continue;
        };
        trace!("Applying manifest rule: `{line}`");
        match rule {
            ManifestRule::Include(patterns) => {
                for pattern in patterns {
                    for file in GlobPattern::new(&pattern).matching_files(repo_dir)? {
                        copy_relative(repo_dir, &file, build_dir)?;
                    }
                }
            }
            ManifestRule::Exclude(patterns) => {
                let root = build_dir.root().to_path_buf();
                for pattern in patterns {
                    for file in GlobPattern::new(&pattern).matching_files(&root)? {
                        build_dir.remove(&file)?;
                    }
                }
            }
            ManifestRule::RecursiveInclude { dir, patterns } => {
                let root = subdirectory(repo_dir, &dir)?;
                for pattern in patterns {
                    for file in GlobPattern::recursive(&pattern).matching_files(&root)? {
                        copy_relative(repo_dir, &file, build_dir)?;
                    }
                }
            }
            ManifestRule::RecursiveExclude { dir, patterns } => {
                let root = subdirectory(build_dir.root(), &dir)?;
                for pattern in patterns {
                    for file in GlobPattern::recursive(&pattern).matching_files(&root)? {
                        build_dir.remove(&file)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// The license files at the repository root, e.g. `LICENSE` or `LICENCE.txt`.
pub(crate) fn license_files(repo_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    GlobPattern::new("LICEN[CS]E*").matching_files(repo_dir)
}

/// Resolve the directory of a recursive rule, which must not leave `root`.
fn subdirectory(root: &Path, dir: &str) -> Result<PathBuf, Error> {
    let path = rh_fs::normalize_path(root.join(dir));
    if path.starts_with(rh_fs::normalize_path(root)) {
        Ok(path)
    } else {
        Err(Error::InvalidManifestDirectory(dir.to_string()))
    }
}

fn copy_relative(repo_dir: &Path, file: &Path, build_dir: &mut BuildDirectory) -> Result<(), Error> {
    let relative = rh_fs::relative_to(file, repo_dir)?;
    build_dir.copy_in(file, &relative.portable_display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use crate::build_dir::BuildDirectory;

    use super::{ManifestRule, copy_manifest_additional, iter_source_files};

    fn touch(path: &Path) {
        fs_err::create_dir_all(path.parent().unwrap()).unwrap();
        fs_err::write(path, "").unwrap();
    }

    fn staged(build_dir: &BuildDirectory) -> Vec<String> {
        build_dir
            .files("")
            .unwrap()
            .into_iter()
            .map(|file| file.relative)
            .collect()
    }

    #[test]
    fn source_files_skip_bytecode_caches() {
        let temp_dir = TempDir::new().unwrap();
        let pkg = temp_dir.path().join("pkg");
        touch(&pkg.join("a.py"));
        touch(&pkg.join("b.pyi"));
        touch(&pkg.join("__pycache__").join("c.py"));
        touch(&pkg.join("__pycache__").join("a.cpython-38.pyc"));
        touch(&pkg.join("templates").join("setup.cfg"));
        touch(&pkg.join("sub").join("_speedups.pyx"));
        touch(&pkg.join("py.typed"));

        let files: Vec<_> = iter_source_files(&pkg)
            .unwrap()
            .into_iter()
            .map(|file| file.strip_prefix(&pkg).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(files, ["a.py", "b.pyi", "py.typed", "sub/_speedups.pyx"]);
    }

    #[test]
    fn missing_package_directory() {
        let temp_dir = TempDir::new().unwrap();
        let err = iter_source_files(&temp_dir.path().join("pkg")).unwrap_err();
        assert!(err.to_string().starts_with("Package directory not found: "));
    }

    #[test]
    fn parse_rules() {
        assert_eq!(
            ManifestRule::parse("include repo_helper/files/*.json  LICENSE"),
            Some(ManifestRule::Include(vec![
                "repo_helper/files/*.json".to_string(),
                "LICENSE".to_string()
            ]))
        );
        assert_eq!(
            ManifestRule::parse("recursive-exclude build *"),
            Some(ManifestRule::RecursiveExclude {
                dir: "build".to_string(),
                patterns: vec!["*".to_string()]
            })
        );
        assert_eq!(ManifestRule::parse("graft repo_helper/templates"), None);
        assert_eq!(ManifestRule::parse("recursive-include"), None);
        assert_eq!(ManifestRule::parse(""), None);
    }

    #[test]
    fn later_rules_win() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        touch(&repo.join("build").join("x.txt"));
        touch(&repo.join("repo_helper").join("templates").join("setup._py"));
        touch(&repo.join("repo_helper").join("templates").join("nested").join("tox._ini"));
        touch(&repo.join("repo_helper").join("templates").join("notes.txt"));
        // Directories matching a pattern are skipped.
        fs_err::create_dir_all(repo.join("repo_helper").join("templates").join("dir._py")).unwrap();

        let mut build_dir = BuildDirectory::new(temp_dir.path().join("build"));
        build_dir.prepare("repo_helper").unwrap();

        let rules = [
            "include build/x.txt",
            "recursive-include repo_helper/templates *",
            "recursive-exclude build *",
            "exclude repo_helper/templates/*.txt",
            "prune doc-source",
        ]
        .map(ToString::to_string);
        copy_manifest_additional(&rules, &repo, &mut build_dir).unwrap();

        assert_eq!(
            staged(&build_dir),
            [
                "repo_helper/templates/nested/tox._ini",
                "repo_helper/templates/setup._py",
            ]
        );
    }

    #[test]
    fn recursive_rules_stay_inside_the_repository() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("repo");
        fs_err::create_dir_all(&repo).unwrap();
        let mut build_dir = BuildDirectory::new(temp_dir.path().join("build"));
        build_dir.prepare("pkg").unwrap();

        let rules = ["recursive-include ../.. *".to_string()];
        let err = copy_manifest_additional(&rules, &repo, &mut build_dir).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Manifest rule directory must be inside the repository: `../..`"
        );
    }
}
