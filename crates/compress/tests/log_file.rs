use std::io::{BufRead, Write};

use compress::{Compression, LogFile};
use flate2::write::GzEncoder;

fn read_lines(log: &mut LogFile) -> Vec<String> {
    log.reader_mut().lines().map(Result::unwrap).collect()
}

#[test]
fn gzip_files_are_decoded_and_offset_counts_raw_bytes() {
    let mut file = tempfile::Builder::new().suffix(".log.gz").tempfile().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    for i in 0..100 {
        writeln!(encoder, "line {i}").unwrap();
    }
    let compressed = encoder.finish().unwrap();
    file.write_all(&compressed).unwrap();
    file.flush().unwrap();

    let mut log = LogFile::open(file.path(), true).unwrap();
    assert_eq!(log.compression(), Compression::Gzip);
    let lines = read_lines(&mut log);
    assert_eq!(lines.len(), 100);
    assert_eq!(lines[99], "line 99");
    assert_eq!(log.offset().get(), compressed.len() as u64);
    assert!(!log.is_truncated().unwrap());
}

#[cfg(feature = "zstd")]
#[test]
fn zstd_files_are_decoded() {
    let mut file = tempfile::Builder::new().suffix(".zst").tempfile().unwrap();
    let compressed = zstd::stream::encode_all(&b"alpha\nbeta\n"[..], 3).unwrap();
    file.write_all(&compressed).unwrap();
    file.flush().unwrap();

    let mut log = LogFile::open(file.path(), false).unwrap();
    assert_eq!(read_lines(&mut log), vec!["alpha", "beta"]);
}

#[test]
fn missing_file_is_not_found() {
    let err = LogFile::open(std::path::Path::new("/nonexistent/x.log"), false)
        .err()
        .unwrap();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
