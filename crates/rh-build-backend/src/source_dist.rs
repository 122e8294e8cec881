use tracing::debug;

use rh_configuration::CONFIG_FILE_NAMES;
use rh_distribution_filename::SourceDistFilename;
use rh_fs::Simplified;

use crate::archive::TarGzWriter;
use crate::builder::{MetadataWritten, Staged};
use crate::metadata::compose;
use crate::source::license_files;
use crate::{ArchiveWriter, Builder, Error, FileList, ListWriter};

/// Files from the repository root that every source distribution must contain.
const SDIST_FILES: [&str; 3] = ["pyproject.toml", "README.rst", "requirements.txt"];

impl Builder {
    /// Build a source distribution into the output directory.
    pub fn build_sdist(&mut self) -> Result<SourceDistFilename, Error> {
        let filename = self.sdist_filename();
        let staged = self.stage()?;
        let metadata = self.write_sdist_metadata(&filename, staged)?;

        let sdist_path = self.out_dir.join(filename.to_string());
        debug!("Writing source distribution at {}", sdist_path.user_display());
        let writer = TarGzWriter::gz(sdist_path, self.mtime())?;
        self.write_sdist(&metadata, writer)?;
        Ok(filename)
    }

    /// List the files that would be included in a source distribution and their origin.
    pub fn list_sdist(&mut self) -> Result<(SourceDistFilename, FileList), Error> {
        let filename = self.sdist_filename();
        let staged = self.stage()?;
        let metadata = self.write_sdist_metadata(&filename, staged)?;

        let mut files = FileList::new();
        let writer = ListWriter::new(&mut files);
        self.write_sdist(&metadata, writer)?;
        Ok((filename, files))
    }

    /// `STAGED → METADATA_WRITTEN`: add the license files, the configuration, the packaging
    /// files and `PKG-INFO` to the build directory.
    fn write_sdist_metadata(
        &mut self,
        filename: &SourceDistFilename,
        _staged: Staged,
    ) -> Result<MetadataWritten, Error> {
        for license in license_files(&self.repo_dir)? {
            let Some(name) = license.file_name() else {
                continue;
            };
            self.build_dir.copy_in(&license, &name.to_string_lossy())?;
        }

        // Only the configuration file that is actually read, `repo_helper.yml` wins.
        let config_file = CONFIG_FILE_NAMES
            .iter()
            .find(|name| self.repo_dir.join(name).is_file());
        let additional = self
            .config
            .additional_requirements_files
            .iter()
            .map(String::as_str);
        let files: Vec<&str> = config_file
            .copied()
            .into_iter()
            .chain(SDIST_FILES)
            .chain(additional)
            .collect();
        for relative in files {
            let path = self.repo_dir.join(relative);
            if !path.is_file() {
                return Err(Error::MissingSdistFile(path));
            }
            self.build_dir.copy_in(&path, relative)?;
        }

        let metadata = compose(&self.config, &self.repo_dir)?;
        self.build_dir
            .write("PKG-INFO", metadata.core_metadata_format())?;

        Ok(MetadataWritten {
            archive_dir: filename.top_level_dir(),
        })
    }

    /// `METADATA_WRITTEN → CLOSED`: write every staged file below the top level directory.
    fn write_sdist(
        &self,
        metadata: &MetadataWritten,
        mut writer: impl ArchiveWriter,
    ) -> Result<(), Error> {
        for file in self.build_dir.files("")? {
            writer.write_file(&format!("{}/{}", metadata.archive_dir, file.relative), &file)?;
        }
        writer.close(&metadata.archive_dir)
    }
}
