use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use rh_distribution_filename::WheelFilename;
use rh_fs::Simplified;

use crate::build_dir::StagedFile;
use crate::builder::{MetadataWritten, Staged};
use crate::entry_points::entry_points_txt;
use crate::metadata::compose;
use crate::source::license_files;
use crate::{ArchiveWriter, Builder, Error, FileList, ListWriter, archive_mode};

impl Builder {
    /// Build a wheel into the output directory.
    pub fn build_wheel(&mut self) -> Result<WheelFilename, Error> {
        let filename = self.wheel_filename();
        let staged = self.stage()?;
        let metadata = self.write_wheel_metadata(&filename, staged)?;

        let wheel_path = self.out_dir.join(filename.to_string());
        debug!("Writing wheel at {}", wheel_path.user_display());
        let writer = ZipArchiveWriter::new(wheel_path)?;
        self.write_wheel(&metadata, writer)?;
        Ok(filename)
    }

    /// List the files that would be included in a wheel and their origin.
    pub fn list_wheel(&mut self) -> Result<(WheelFilename, FileList), Error> {
        let filename = self.wheel_filename();
        let staged = self.stage()?;
        let metadata = self.write_wheel_metadata(&filename, staged)?;

        let mut files = FileList::new();
        let writer = ListWriter::new(&mut files);
        self.write_wheel(&metadata, writer)?;
        // The `RECORD` file is generated when closing the archive.
        files.push((format!("{}/RECORD", metadata.archive_dir), None));
        Ok((filename, files))
    }

    /// `STAGED → METADATA_WRITTEN`: write the license files, `entry_points.txt`, `METADATA`,
    /// `WHEEL` and `top_level.txt` into the `.dist-info` directory.
    fn write_wheel_metadata(
        &mut self,
        filename: &WheelFilename,
        _staged: Staged,
    ) -> Result<MetadataWritten, Error> {
        let dist_info_dir = filename.dist_info_dir();
        let dist_info_path = self.build_dir.dist_info_path(&dist_info_dir)?;
        trace!("Writing metadata to {}", dist_info_path.user_display());

        for license in license_files(&self.repo_dir)? {
            let Some(name) = license.file_name() else {
                continue;
            };
            self.build_dir.copy_in(
                &license,
                &format!("{dist_info_dir}/{}", name.to_string_lossy()),
            )?;
        }

        self.build_dir.write(
            &format!("{dist_info_dir}/entry_points.txt"),
            entry_points_txt(&self.config)?,
        )?;

        let metadata = compose(&self.config, &self.repo_dir)?;
        self.build_dir.write(
            &format!("{dist_info_dir}/METADATA"),
            metadata.core_metadata_format(),
        )?;

        self.build_dir
            .write(&format!("{dist_info_dir}/WHEEL"), wheel_info(filename))?;

        self.build_dir.write(
            &format!("{dist_info_dir}/top_level.txt"),
            format!("{}\n", self.config.top_level_name()),
        )?;

        Ok(MetadataWritten {
            archive_dir: dist_info_dir,
        })
    }

    /// `METADATA_WRITTEN → CLOSED`: write the package directory and the `.dist-info` directory
    /// to the archive.
    fn write_wheel(
        &self,
        metadata: &MetadataWritten,
        mut writer: impl ArchiveWriter,
    ) -> Result<(), Error> {
        let pkg_files = self.build_dir.files(&self.config.pkg_dir())?;
        // `RECORD` and its signatures go after every other file.
        let (records, dist_info_files): (Vec<_>, Vec<_>) = self
            .build_dir
            .files(&metadata.archive_dir)?
            .into_iter()
            .partition(|file| is_record(&file.relative));
        for file in pkg_files.iter().chain(&dist_info_files).chain(&records) {
            writer.write_file(&self.wheel_path(&file.relative), file)?;
        }
        writer.close(&metadata.archive_dir)
    }

    /// The path of a staged file inside the wheel, where the package is installed at the top
    /// level even for a `src` layout.
    fn wheel_path<'a>(&self, relative: &'a str) -> &'a str {
        let source_dir = self.config.source_dir.trim_matches('/');
        if source_dir.is_empty() {
            return relative;
        }
        relative
            .strip_prefix(source_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(relative)
    }
}

/// The contents of the `WHEEL` file.
fn wheel_info(filename: &WheelFilename) -> String {
    format!(
        "Wheel-Version: 1.0\nGenerator: repo-helper ({})\nRoot-Is-Purelib: true\nTag: {}\n",
        env!("CARGO_PKG_VERSION"),
        filename.tag()
    )
}

/// A single entry in a RECORD file.
///
/// See: <https://packaging.python.org/en/latest/specifications/recording-installed-packages/#the-record-file>
///
/// ```csv
/// repo_helper/cli.py,sha256=x_c8nmc4Huc-lKEsAXj78ZiyqSJ9hJ71j7vltY67icw,10509
/// repo_helper-2020.12.18.dist-info/RECORD,,
/// ```
#[derive(Serialize)]
struct RecordEntry {
    path: String,
    hash: Option<String>,
    size: Option<u64>,
}

/// Whether a file is `RECORD` or one of its signatures, such as `RECORD.jws`.
fn is_record(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|name| name.contains("RECORD"))
}

/// The `sha256=<urlsafe-base64 digest, no padding>` hash of a RECORD entry.
fn record_hash(bytes: &[u8]) -> String {
    format!("sha256={}", URL_SAFE_NO_PAD.encode(Sha256::digest(bytes)))
}

/// Zip archive (wheel) writer.
///
/// Writes to a temporary file next to the wheel that is renamed on close.
struct ZipArchiveWriter {
    path: PathBuf,
    writer: ZipWriter<NamedTempFile>,
    record: Vec<RecordEntry>,
}

impl ZipArchiveWriter {
    fn new(path: PathBuf) -> Result<Self, Error> {
        let parent = path.parent().unwrap_or(Path::new("."));
        let file = rh_fs::tempfile_in(parent)?;
        Ok(Self {
            path,
            writer: ZipWriter::new(file),
            record: Vec::new(),
        })
    }

    /// Fixed timestamps keep wheels reproducible.
    fn file_options(mode: u32, compression_method: CompressionMethod) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(compression_method)
            .unix_permissions(mode)
            .last_modified_time(zip::DateTime::default())
    }

    fn add(&mut self, path: &str, bytes: &[u8], mode: u32) -> Result<(), Error> {
        self.writer
            .start_file(path, Self::file_options(mode, CompressionMethod::Deflated))?;
        self.writer.write_all(bytes)?;

        let (hash, size) = if is_record(path) {
            (None, None)
        } else {
            (Some(record_hash(bytes)), Some(bytes.len() as u64))
        };
        self.record.push(RecordEntry {
            path: path.to_string(),
            hash,
            size,
        });
        Ok(())
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        self.add(path, bytes, 0o644)
    }

    fn write_file(&mut self, path: &str, file: &StagedFile) -> Result<(), Error> {
        // The real `RECORD` is generated on close.
        if path.ends_with(".dist-info/RECORD") {
            trace!("Skipping staged {path}");
            return Ok(());
        }
        let bytes = fs_err::read(&file.path)?;
        self.add(path, &bytes, archive_mode(&file.path)?)
    }

    fn close(mut self, dist_info_dir: &str) -> Result<(), Error> {
        let record_path = format!("{dist_info_dir}/RECORD");
        trace!("Adding {record_path}");
        self.record.push(RecordEntry {
            path: record_path.clone(),
            hash: None,
            size: None,
        });

        let mut record_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .escape(b'"')
            .from_writer(Vec::new());
        for entry in &self.record {
            record_writer.serialize(entry)?;
        }
        let record = record_writer
            .into_inner()
            .map_err(|err| Error::Io(err.into_error()))?;

        self.writer.start_file(
            record_path,
            Self::file_options(0o644, CompressionMethod::Stored),
        )?;
        self.writer.write_all(&record)?;

        let file = self.writer.finish()?;
        rh_fs::persist(file, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fs_err::File;
    use insta::assert_snapshot;
    use tempfile::TempDir;

    use rh_distribution_filename::WheelFilename;

    use super::{ZipArchiveWriter, is_record, record_hash, wheel_info};
    use crate::Builder;
    use crate::tests::repository;

    #[test]
    fn wheel_file() {
        let filename = WheelFilename::new(
            "repo-helper".parse().unwrap(),
            "2020.12.18".parse().unwrap(),
        );
        let wheel = wheel_info(&filename);
        let wheel = wheel.replace(env!("CARGO_PKG_VERSION"), "[VERSION]");
        assert_snapshot!(wheel, @r"
        Wheel-Version: 1.0
        Generator: repo-helper ([VERSION])
        Root-Is-Purelib: true
        Tag: py3-none-any
        ");
    }

    #[test]
    fn hash_format() {
        assert_eq!(
            record_hash(b""),
            "sha256=47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU"
        );
    }

    #[test]
    fn record_files_last() {
        let repo = repository();
        let scratch = TempDir::new().unwrap();
        let mut builder = Builder::new(
            repo.path(),
            Some(&scratch.path().join("build")),
            Some(scratch.path()),
        )
        .unwrap();

        let filename = builder.wheel_filename();
        let staged = builder.stage().unwrap();
        let metadata = builder.write_wheel_metadata(&filename, staged).unwrap();
        builder
            .build_dir
            .write(&format!("{}/RECORD.jws", metadata.archive_dir), "{}")
            .unwrap();

        let wheel_path = scratch.path().join(filename.to_string());
        let writer = ZipArchiveWriter::new(wheel_path.clone()).unwrap();
        builder.write_wheel(&metadata, writer).unwrap();

        let archive = zip::ZipArchive::new(File::open(&wheel_path).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(
            names[names.len() - 3..],
            [
                "repo_helper-2020.12.18.dist-info/top_level.txt",
                "repo_helper-2020.12.18.dist-info/RECORD.jws",
                "repo_helper-2020.12.18.dist-info/RECORD",
            ]
        );
    }

    #[test]
    fn record_names() {
        assert!(is_record("foo-1.0.dist-info/RECORD"));
        assert!(is_record("foo-1.0.dist-info/RECORD.p7s"));
        assert!(!is_record("foo-1.0.dist-info/METADATA"));
        assert!(!is_record("RECORD_dir/module.py"));
    }
}
