//! Conda packages, assembled from the installed wheel.
//!
//! See <https://docs.conda.io/projects/conda-build/en/latest/resources/package-spec.html>.

use std::fmt::{Display, Formatter};
use std::path::Path;

use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

use rh_distribution_filename::{CondaFilename, WheelFilename};
use rh_fs::Simplified;
use rh_requirements::combine_requirements;
use rh_warnings::{warn_user, warn_user_once};

use crate::archive::TarBz2Writer;
use crate::build_dir::{BuildDirectory, StagedFile};
use crate::channels::{ChannelIndex, validate_requirements};
use crate::glob::GlobPattern;
use crate::installer::WheelInstaller;
use crate::metadata::{parse_extra, runtime_requirements};
use crate::{ArchiveWriter, Builder, Error};

/// Every package is the first build of its version.
const BUILD_NUMBER: u64 = 1;

/// The steps of a Conda build, each of which can fail on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondaStage {
    /// Checking that the configured channels provide every dependency.
    Dependencies,
    /// Building the wheel into the output directory.
    BuildWheel,
    /// Installing the wheel into a scratch directory.
    Install,
    /// Writing the `info` directory and archiving the installed files.
    Repackage,
}

impl CondaStage {
    fn attribute(self, err: Error) -> Error {
        Error::CondaStage {
            stage: self,
            source: Box::new(err),
        }
    }
}

impl Display for CondaStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dependencies => f.write_str("checking the dependencies"),
            Self::BuildWheel => f.write_str("building the wheel"),
            Self::Install => f.write_str("installing the wheel"),
            Self::Repackage => f.write_str("repackaging the installed wheel"),
        }
    }
}

/// `info/index.json`
#[derive(Debug, Serialize)]
struct IndexJson {
    name: String,
    version: String,
    build: String,
    build_number: u64,
    depends: Vec<String>,
    arch: Option<String>,
    noarch: &'static str,
    platform: Option<String>,
    subdir: &'static str,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
}

/// `info/about.json`
#[derive(Debug, Serialize)]
struct AboutJson {
    home: String,
    dev_url: String,
    doc_url: String,
    license: String,
    summary: String,
    description: String,
    extra: AboutExtra,
}

#[derive(Debug, Serialize)]
struct AboutExtra {
    maintainers: Vec<String>,
}

impl Builder {
    /// Build a `noarch: python` Conda package into the output directory.
    ///
    /// The dependencies are checked against the configured `conda_channels` with `channels`
    /// first. The wheel is then built and installed into a scratch directory with `installer`,
    /// and the installed package is archived together with the Conda metadata.
    pub fn build_conda(
        &mut self,
        installer: &dyn WheelInstaller,
        channels: &dyn ChannelIndex,
    ) -> Result<CondaFilename, Error> {
        let depends = self
            .conda_depends(channels)
            .map_err(|err| CondaStage::Dependencies.attribute(err))?;

        let wheel = self
            .build_wheel()
            .map_err(|err| CondaStage::BuildWheel.attribute(err))?;

        let prefix = tempfile::tempdir().map_err(|err| CondaStage::Install.attribute(err.into()))?;
        let wheel_path = self.out_dir.join(wheel.to_string());
        debug!(
            "Installing {} into {}",
            wheel_path.user_display(),
            prefix.path().user_display()
        );
        installer
            .install(&wheel_path, prefix.path())
            .map_err(|err| CondaStage::Install.attribute(err))?;

        self.repackage_conda(&wheel, prefix.path(), depends)
            .map_err(|err| CondaStage::Repackage.attribute(err))
    }

    fn repackage_conda(
        &mut self,
        wheel: &WheelFilename,
        prefix: &Path,
        depends: Vec<String>,
    ) -> Result<CondaFilename, Error> {
        let filename = CondaFilename::new(
            &self.config.repo_name,
            self.config.version.clone(),
            BUILD_NUMBER,
        );
        self.build_dir.clear()?;
        let info = self.build_dir.info_path()?;
        debug!("Writing Conda metadata to {}", info.user_display());

        self.write_conda_license()?;
        self.write_conda_about()?;
        self.write_conda_index(&filename, depends)?;

        let installed = installed_files(prefix, &self.config.top_level_name(), wheel)?;
        let files = installed
            .iter()
            .map(|(archive_path, _)| format!("{archive_path}\n"))
            .join("");
        self.build_dir.write("info/files", files)?;

        let conda_path = self.out_dir.join(filename.to_string());
        debug!("Writing Conda package at {}", conda_path.user_display());
        let mut writer = TarBz2Writer::bz2(conda_path, self.mtime())?;
        for file in self.build_dir.files("info")? {
            writer.write_file(&file.relative, &file)?;
        }
        // The package is installed by conda, not by the tool that unpacked the wheel.
        let installer = format!("site-packages/{}/INSTALLER", wheel.dist_info_dir());
        for (archive_path, file) in &installed {
            if *archive_path == installer {
                writer.write_bytes(archive_path, b"conda")?;
            } else {
                writer.write_file(archive_path, file)?;
            }
        }
        writer.close("")?;

        Ok(filename)
    }

    /// Copy the first `LICENSE` or `LICENCE` file to `info/license.txt`.
    fn write_conda_license(&mut self) -> Result<(), Error> {
        let license = GlobPattern::new("LICEN[CS]E")
            .matching_files(&self.repo_dir)?
            .into_iter()
            .next();
        if let Some(license) = license {
            self.build_dir.copy_in(&license, "info/license.txt")?;
        } else {
            warn_user!("No `LICENSE` file found, the Conda package has no `info/license.txt`");
        }
        Ok(())
    }

    fn write_conda_about(&mut self) -> Result<(), Error> {
        let github_url = self.config.github_url();
        let mut description = self.config.conda_description.clone();
        if !self.config.conda_channels.is_empty() {
            description.push_str(
                "\n\n\nBefore installing please ensure you have added the following channels: ",
            );
            description.push_str(&self.config.conda_channels.join(", "));
        }

        let about = AboutJson {
            home: github_url.clone(),
            dev_url: github_url,
            doc_url: self.config.docs_url.clone(),
            license: self.config.license.clone(),
            summary: self.config.short_desc.clone(),
            description,
            extra: AboutExtra {
                maintainers: vec![
                    self.config.author.clone(),
                    format!("github.com/{}", self.config.username),
                ],
            },
        };
        let about = serde_json::to_string_pretty(&about)
            .map_err(|err| Error::Json("about.json", err))?;
        self.build_dir.write("info/about.json", about)?;
        Ok(())
    }

    fn write_conda_index(
        &mut self,
        filename: &CondaFilename,
        depends: Vec<String>,
    ) -> Result<(), Error> {
        let timestamp = match self.source_date_epoch() {
            Some(epoch) => i64::try_from(epoch)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000),
            None => jiff::Timestamp::now().as_millisecond(),
        };
        let index = IndexJson {
            name: filename.name().to_string(),
            version: filename.version.to_string(),
            build: filename.build_string(),
            build_number: filename.build_number,
            depends,
            arch: None,
            noarch: "python",
            platform: None,
            subdir: "noarch",
            timestamp,
        };
        let index = serde_json::to_string_pretty(&index)
            .map_err(|err| Error::Json("index.json", err))?;
        self.build_dir.write("info/index.json", index)?;
        Ok(())
    }

    /// The runtime requirements plus those of the configured `conda_extras`, as Conda match
    /// specifications named as on the channels.
    ///
    /// Conda has no markers or extras, so both are dropped before merging.
    fn conda_depends(&self, channels: &dyn ChannelIndex) -> Result<Vec<String>, Error> {
        let mut requirements = runtime_requirements(&self.repo_dir)?;
        for extra in &self.config.conda_extras {
            if let Some(extra_requirements) = self.config.extras_require.get(extra) {
                requirements.extend(parse_extra(extra, extra_requirements)?);
            }
        }

        let requirements = requirements.into_iter().filter_map(|requirement| {
            if requirement.url().is_some() {
                warn_user_once!(
                    "Skipping direct URL requirement `{requirement}`, Conda packages can't depend on URLs"
                );
                None
            } else {
                Some(requirement.without_extras_and_marker())
            }
        });

        let requirements = combine_requirements(requirements)
            .into_iter()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect_vec();
        let validated =
            validate_requirements(&requirements, &self.config.conda_channels, channels)?;

        Ok(validated
            .into_iter()
            .map(|(name, requirement)| {
                let specifiers = requirement
                    .specifiers()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                format!("{name}{specifiers}")
            })
            .collect())
    }
}

/// The installed package and `.dist-info` directory below `prefix`, with their path in the
/// Conda package, sorted by that path.
fn installed_files(
    prefix: &Path,
    top_level_name: &str,
    wheel: &WheelFilename,
) -> Result<Vec<(String, StagedFile)>, Error> {
    let dist_info_dir = wheel.dist_info_dir();
    let installed = BuildDirectory::new(prefix);
    let mut files = Vec::new();
    for relative_dir in [top_level_name, dist_info_dir.as_str()] {
        for file in installed.files(relative_dir)? {
            files.push((format!("site-packages/{}", file.relative), file));
        }
    }
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::CondaStage;
    use crate::Error;

    #[test]
    fn stage_errors() {
        let err = CondaStage::Install.attribute(Error::MissingPackageDir("pkg".into()));
        insta::assert_snapshot!(err, @"Failed to build the Conda package while installing the wheel");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Package directory not found: pkg");
    }
}
