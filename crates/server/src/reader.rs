//! Blocking line reader over one (possibly compressed) log file.

use std::io::{self, BufRead};
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use compress::LogFile;
use filters::RawLine;
use protocol::ReadMode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ReadError;
use crate::messenger::Messenger;

/// Knobs of one reader run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReaderSettings {
    pub(crate) mode: ReadMode,
    pub(crate) seek_end: bool,
    pub(crate) max_line_length: usize,
    pub(crate) eof_poll: Duration,
    pub(crate) truncate_check: Duration,
}

#[derive(Debug, Eq, PartialEq)]
enum Chunk {
    Line,
    Split,
    Eof,
}

/// Reads into `buf` up to and including the next newline, but never past
/// `max` bytes in total.
fn read_capped(reader: &mut dyn BufRead, buf: &mut Vec<u8>, max: usize) -> io::Result<Chunk> {
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(Chunk::Eof);
        }
        let room = max.saturating_sub(buf.len());
        if room == 0 {
            if available[0] == b'\n' {
                buf.push(b'\n');
                reader.consume(1);
                return Ok(Chunk::Line);
            }
            return Ok(Chunk::Split);
        }
        let window = &available[..available.len().min(room)];
        if let Some(end) = memchr::memchr(b'\n', window) {
            buf.extend_from_slice(&window[..=end]);
            reader.consume(end + 1);
            return Ok(Chunk::Line);
        }
        let taken = window.len();
        buf.extend_from_slice(window);
        reader.consume(taken);
    }
}

/// Streams the lines of `path` into `tx` until EOF (cat and grep), until
/// cancelled or the receiver closes (tail), or until a tailed file shrinks.
///
/// Lines longer than the configured maximum are split into several
/// lines, each ending in a newline; the client is warned once per
/// original line.
pub(crate) fn read_lines(
    path: &Path,
    settings: ReaderSettings,
    tx: &mpsc::Sender<RawLine>,
    messenger: &Messenger,
    cancel: &CancellationToken,
) -> Result<(), ReadError> {
    let tail = settings.mode.is_tail();
    let mut file = LogFile::open(path, settings.seek_end).map_err(|source| ReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let max = settings.max_line_length.max(1);
    let mut buf = Vec::new();
    let mut count = 0_u64;
    let mut splitting = false;
    let mut last_check = Instant::now();

    loop {
        if cancel.is_cancelled() || tx.is_closed() {
            return Ok(());
        }
        if tail && last_check.elapsed() >= settings.truncate_check {
            last_check = Instant::now();
            if file.is_truncated().map_err(|source| ReadError::Read {
                path: path.to_path_buf(),
                source,
            })? {
                return Err(ReadError::Truncated {
                    path: path.to_path_buf(),
                });
            }
        }

        let chunk = read_capped(file.reader_mut(), &mut buf, max).map_err(|source| ReadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match chunk {
            Chunk::Line => splitting = false,
            Chunk::Split => {
                if !splitting {
                    messenger.warn_blocking(format!(
                        "{}: line {} is longer than {max} bytes, splitting it",
                        path.display(),
                        count + 1
                    ));
                    splitting = true;
                }
                buf.push(b'\n');
            }
            Chunk::Eof if tail => {
                std::thread::sleep(settings.eof_poll);
                continue;
            }
            Chunk::Eof => {
                if !buf.is_empty() {
                    count += 1;
                    let _ = tx.blocking_send(RawLine {
                        content: Bytes::from(std::mem::take(&mut buf)),
                        count,
                    });
                }
                return Ok(());
            }
        }

        count += 1;
        let line = RawLine {
            content: Bytes::from(std::mem::take(&mut buf)),
            count,
        };
        if tx.blocking_send(line).is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;

    use protocol::Frame;

    use super::*;

    fn settings(mode: ReadMode, max: usize) -> ReaderSettings {
        ReaderSettings {
            mode,
            seek_end: mode.is_tail(),
            max_line_length: max,
            eof_poll: Duration::from_millis(5),
            truncate_check: Duration::from_millis(20),
        }
    }

    #[test]
    fn capped_reads_split_long_lines() {
        let mut reader = Cursor::new(b"abcdefgh\nxy".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_capped(&mut reader, &mut buf, 5).unwrap(), Chunk::Split);
        assert_eq!(buf, b"abcde");
        buf.clear();
        assert_eq!(read_capped(&mut reader, &mut buf, 5).unwrap(), Chunk::Line);
        assert_eq!(buf, b"fgh\n");
        buf.clear();
        assert_eq!(read_capped(&mut reader, &mut buf, 5).unwrap(), Chunk::Eof);
        assert_eq!(buf, b"xy");
    }

    #[test]
    fn cat_reads_every_line_and_warns_once_per_long_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "short\nthis line is rather long\nend").unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let (frames_tx, mut frames) = mpsc::channel(8);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        read_lines(&path, settings(ReadMode::Cat, 8), &tx, &messenger, &CancellationToken::new())
            .unwrap();
        drop(tx);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push((line.count, String::from_utf8(line.content.to_vec()).unwrap()));
        }
        assert_eq!(lines[0], (1, "short\n".to_owned()));
        assert_eq!(lines[1], (2, "this lin\n".to_owned()));
        assert_eq!(lines.last().unwrap().1, "end");
        assert!(lines.iter().all(|(_, l)| l.len() <= 9));

        assert!(matches!(frames.try_recv(), Ok(Frame::Server { text, .. }) if text.starts_with("WARN|")));
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn tail_reports_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        fs::write(&path, "old line one\nold line two\n").unwrap();

        let (tx, _rx) = mpsc::channel(64);
        let (frames_tx, _frames) = mpsc::channel(8);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        let truncate = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                fs::write(&path, "").unwrap();
            })
        };
        let err = read_lines(&path, settings(ReadMode::Tail, 1024), &tx, &messenger, &CancellationToken::new())
            .unwrap_err();
        truncate.join().unwrap();
        assert!(matches!(err, ReadError::Truncated { .. }));
    }

    #[test]
    fn tail_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        fs::write(&path, "x\n").unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let (frames_tx, _frames) = mpsc::channel(4);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        let cancel = CancellationToken::new();
        let stopper = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                cancel.cancel();
            })
        };
        read_lines(&path, settings(ReadMode::Tail, 1024), &tx, &messenger, &cancel).unwrap();
        stopper.join().unwrap();
    }
}
