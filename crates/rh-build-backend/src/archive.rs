//! Tar archives for source distributions (`.tar.gz`) and Conda packages (`.tar.bz2`).

use std::io;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use fs_err::File;
use tar::{EntryType, Header};
use tempfile::NamedTempFile;

use crate::build_dir::StagedFile;
use crate::{ArchiveWriter, Error, archive_mode};

/// The longest path a ustar header can hold without a prefix.
const USTAR_NAME_LEN: usize = 100;

/// A compression stream over the temporary archive file.
pub(crate) trait Compressor: Write {
    /// Flush the compressed stream and return the underlying file.
    fn finish_file(self) -> io::Result<NamedTempFile>;
}

impl Compressor for GzEncoder<NamedTempFile> {
    fn finish_file(self) -> io::Result<NamedTempFile> {
        self.finish()
    }
}

impl Compressor for BzEncoder<NamedTempFile> {
    fn finish_file(self) -> io::Result<NamedTempFile> {
        self.finish()
    }
}

/// Writes a POSIX tar archive, with PAX headers for long paths.
///
/// Entries are owned by root with fixed permissions and a fixed modification time, so the
/// archive only depends on the file contents.
pub(crate) struct TarWriter<C: Compressor> {
    path: PathBuf,
    tar: tar::Builder<C>,
    mtime: u64,
}

pub(crate) type TarGzWriter = TarWriter<GzEncoder<NamedTempFile>>;
pub(crate) type TarBz2Writer = TarWriter<BzEncoder<NamedTempFile>>;

impl TarGzWriter {
    pub(crate) fn gz(path: PathBuf, mtime: u64) -> Result<Self, Error> {
        let file = temporary_sibling(&path)?;
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        Ok(TarWriter::with_encoder(path, encoder, mtime))
    }
}

impl TarBz2Writer {
    pub(crate) fn bz2(path: PathBuf, mtime: u64) -> Result<Self, Error> {
        let file = temporary_sibling(&path)?;
        let encoder = BzEncoder::new(file, bzip2::Compression::best());
        Ok(TarWriter::with_encoder(path, encoder, mtime))
    }
}

impl<C: Compressor> TarWriter<C> {
    fn with_encoder(path: PathBuf, encoder: C, mtime: u64) -> Self {
        let tar = tar::Builder::new(encoder);
        Self { path, tar, mtime }
    }

    fn append(&mut self, path: &str, size: u64, mode: u32, data: impl Read) -> Result<(), Error> {
        let mut header = Header::new_ustar();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(mode);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        append_entry(&mut self.tar, &mut header, path, data).map_err(|err| Error::TarWrite {
            path: self.path.clone(),
            err,
        })
    }
}

fn append_entry<W: Write>(
    tar: &mut tar::Builder<W>,
    header: &mut Header,
    path: &str,
    data: impl Read,
) -> io::Result<()> {
    if path.len() <= USTAR_NAME_LEN {
        return tar.append_data(header, path, data);
    }
    // Readers take the full path from the PAX header, the ustar name is only a fallback.
    tar.append_pax_extensions([("path", path.as_bytes())])?;
    tar.append_data(header, fallback_name(path), data)
}

/// The file name of a long path, cut to fit a ustar header.
fn fallback_name(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut end = name.len().min(USTAR_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn temporary_sibling(path: &Path) -> io::Result<NamedTempFile> {
    rh_fs::tempfile_in(path.parent().unwrap_or(Path::new(".")))
}

impl<C: Compressor> ArchiveWriter for TarWriter<C> {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        self.append(path, bytes.len() as u64, 0o644, Cursor::new(bytes))
    }

    fn write_file(&mut self, path: &str, file: &StagedFile) -> Result<(), Error> {
        let metadata = fs_err::metadata(&file.path)?;
        let mode = archive_mode(&file.path)?;
        let reader = BufReader::new(File::open(&file.path)?);
        self.append(path, metadata.len(), mode, reader)
    }

    fn close(self, _dist_info_dir: &str) -> Result<(), Error> {
        let tar_error = |err| Error::TarWrite {
            path: self.path.clone(),
            err,
        };
        let encoder = self.tar.into_inner().map_err(tar_error)?;
        let file = encoder.finish_file().map_err(tar_error)?;
        rh_fs::persist(file, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    use super::{ArchiveWriter, TarGzWriter, fallback_name};

    #[test]
    fn long_paths_use_pax_headers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("long.tar.gz");
        let long = format!("repo_helper-2020.12.18/{}/file.py", "nested".repeat(20));

        let mut writer = TarGzWriter::gz(path.clone(), 1_600_000_000).unwrap();
        writer.write_bytes("short.txt", b"short").unwrap();
        writer.write_bytes(&long, b"long").unwrap();
        writer.close("").unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(fs_err::File::open(&path).unwrap()));
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mtime = entry.header().mtime().unwrap();
            let mode = entry.header().mode().unwrap();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            entries.push((name, contents, mtime, mode));
        }
        assert_eq!(
            entries,
            [
                (
                    "short.txt".to_string(),
                    "short".to_string(),
                    1_600_000_000,
                    0o644
                ),
                (long, "long".to_string(), 1_600_000_000, 0o644),
            ]
        );
    }

    #[test]
    fn dropped_writer_leaves_no_archive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.tar.gz");
        let mut writer = TarGzWriter::gz(path.clone(), 0).unwrap();
        writer.write_bytes("a.txt", b"a").unwrap();
        drop(writer);
        assert!(!path.exists());
    }

    #[test]
    fn fallback_names() {
        assert_eq!(fallback_name("a/b/c.py"), "c.py");
        assert_eq!(fallback_name(&"é".repeat(60)).len(), 100);
    }
}
