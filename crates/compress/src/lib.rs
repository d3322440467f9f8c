#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` opens log files for the server's file reader and decodes them
//! transparently: `.gz`/`.gzip` through [`flate2`], `.zst` through
//! [`zstd`](https://docs.rs/zstd) (behind the `zstd` feature), anything else
//! as raw bytes.
//!
//! # Design
//!
//! [`LogFile::open`] returns a buffered line stream together with an
//! [`Offset`] handle counting the raw bytes consumed from disk. The reader
//! compares that offset against the file's current size to detect
//! truncation, independent of how many decoded bytes were produced.
//!
//! # Invariants
//!
//! - The offset only grows; it starts at the file end for tail reads.
//! - Compressed files are never seeked.
//!
//! # Examples
//!
//! ```
//! use std::io::{BufRead, Write};
//! use compress::{Compression, LogFile};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut file = tempfile::Builder::new().suffix(".log").tempfile()?;
//! writeln!(file, "hello")?;
//!
//! let mut log = LogFile::open(file.path(), false)?;
//! assert_eq!(log.compression(), Compression::None);
//! let mut line = String::new();
//! log.reader_mut().read_line(&mut line)?;
//! assert_eq!(line, "hello\n");
//! # Ok(())
//! # }
//! ```

mod algorithm;
mod counting;
mod reader;
pub mod zlib;
#[cfg(feature = "zstd")]
pub mod zstd;

pub use algorithm::Compression;
pub use counting::{CountingReader, Offset};
pub use reader::LogFile;
