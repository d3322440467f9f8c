//! Opening log files for line-oriented reading.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::algorithm::Compression;
use crate::counting::{CountingReader, Offset};

const READ_BUFFER: usize = 64 * 1024;

/// An opened log file: a buffered decoded stream plus the raw offset.
pub struct LogFile {
    path: PathBuf,
    compression: Compression,
    offset: Offset,
    reader: Box<dyn BufRead + Send>,
}

impl LogFile {
    /// Opens `path`, choosing a decoder from its suffix.
    ///
    /// With `seek_end` set, plain files start at their current end so only
    /// appended lines are read. Compressed files are always read from the
    /// start.
    pub fn open(path: &Path, seek_end: bool) -> io::Result<Self> {
        let compression = Compression::from_path(path);
        if !compression.is_supported() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{compression} support is not compiled in"),
            ));
        }

        let mut file = File::open(path)?;
        let start = if seek_end && compression.is_seekable() {
            file.seek(SeekFrom::End(0))?
        } else {
            0
        };

        let offset = Offset::new(start);
        let counted = CountingReader::new(file, offset.clone());
        let reader: Box<dyn BufRead + Send> = match compression {
            Compression::None => Box::new(BufReader::with_capacity(READ_BUFFER, counted)),
            Compression::Gzip => Box::new(BufReader::with_capacity(
                READ_BUFFER,
                crate::zlib::decoder(counted),
            )),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(BufReader::with_capacity(
                READ_BUFFER,
                crate::zstd::decoder(counted)?,
            )),
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "zstd support is not compiled in",
                ));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            compression,
            offset,
            reader,
        })
    }

    /// The opened path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected encoding.
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Shared raw offset, for truncation checks.
    #[must_use]
    pub fn offset(&self) -> Offset {
        self.offset.clone()
    }

    /// Whether the file on disk is now shorter than what was consumed.
    pub fn is_truncated(&self) -> io::Result<bool> {
        let size = std::fs::metadata(&self.path)?.len();
        Ok(self.offset.get() > size)
    }

    /// The decoded line stream.
    pub fn reader_mut(&mut self) -> &mut (dyn BufRead + Send) {
        self.reader.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tail_open_skips_existing_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"old line\n").unwrap();
        let mut log = LogFile::open(file.path(), true).unwrap();
        assert_eq!(log.offset().get(), 9);

        file.write_all(b"new line\n").unwrap();
        file.flush().unwrap();
        let mut line = String::new();
        log.reader_mut().read_line(&mut line).unwrap();
        assert_eq!(line, "new line\n");
        assert_eq!(log.offset().get(), 18);
    }

    #[test]
    fn truncation_is_detected_from_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789\n").unwrap();
        let mut log = LogFile::open(file.path(), false).unwrap();
        let mut line = String::new();
        log.reader_mut().read_line(&mut line).unwrap();
        assert!(!log.is_truncated().unwrap());

        file.as_file().set_len(0).unwrap();
        assert!(log.is_truncated().unwrap());
    }
}
