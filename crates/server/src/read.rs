//! `cat`, `grep` and `tail`: glob expansion, permission checks, one reader
//! plus filter per file, and the hand-off to frames or the aggregate.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use config::{PermissionKind, PermissionSet};
use filters::{ContextOptions, Line, LineFilter, LineRegex};
use protocol::{Frame, ReadMode};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ReadError;
use crate::files;
use crate::messenger::Messenger;
use crate::reader::{ReaderSettings, read_lines};
use crate::server::Shared;

const RAW_BUFFER: usize = 1024;
const LINE_BUFFER: usize = 1024;

/// Where filtered lines go.
#[derive(Clone, Debug)]
pub(crate) enum LineSink {
    /// Straight to the client as `REMOTE` frames, or bare when spartan.
    Frames { spartan: bool },
    /// Into the session's map-reduce aggregate.
    Aggregate(mpsc::Sender<Line>),
}

/// One read command.
#[derive(Debug)]
pub(crate) struct ReadJob {
    pub(crate) shared: Arc<Shared>,
    pub(crate) messenger: Messenger,
    pub(crate) permissions: Arc<PermissionSet>,
    pub(crate) mode: ReadMode,
    pub(crate) glob: String,
    pub(crate) regex: LineRegex,
    pub(crate) context: ContextOptions,
    pub(crate) sink: LineSink,
}

/// Converts filtered lines into frames for the session writer.
pub(crate) fn spawn_forwarder(messenger: Messenger, spartan: bool) -> (mpsc::Sender<Line>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Line>(LINE_BUFFER);
    let handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let frame = if spartan {
                Frame::Plain(line.content)
            } else {
                Frame::Line {
                    host: messenger.host().to_owned(),
                    percent: line.percent,
                    count: line.count,
                    source: line.source.to_string(),
                    content: line.content,
                }
            };
            if !messenger.send(frame).await {
                break;
            }
        }
    });
    (tx, handle)
}

/// Serves one read command; returns once every matched file is done.
pub(crate) async fn read_glob(job: ReadJob, cancel: CancellationToken) {
    let (output, forwarder) = match &job.sink {
        LineSink::Aggregate(tx) => (tx.clone(), None),
        LineSink::Frames { spartan } => {
            let (tx, handle) = spawn_forwarder(job.messenger.clone(), *spartan);
            (tx, Some(handle))
        }
    };
    let job = Arc::new(job);
    let mut seen = HashSet::new();
    let mut readers = JoinSet::new();

    for pattern in job.glob.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let paths = files::expand(pattern, &job.shared.timing, &job.messenger, &cancel).await;
        if paths.is_empty() {
            if !cancel.is_cancelled() {
                job.messenger
                    .error(format!("no file matches '{pattern}'"))
                    .await;
            }
            continue;
        }
        for path in paths {
            if !seen.insert(path.clone()) {
                continue;
            }
            if !job
                .permissions
                .allows(PermissionKind::ReadFiles, &path.to_string_lossy())
            {
                job.messenger
                    .error(format!("no permission to read {}", path.display()))
                    .await;
                continue;
            }
            let source = files::glob_id(pattern, &path);
            readers.spawn(read_file(
                Arc::clone(&job),
                path,
                source,
                output.clone(),
                cancel.clone(),
            ));
        }
    }

    while readers.join_next().await.is_some() {}
    drop(output);
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }
}

async fn read_file(
    job: Arc<ReadJob>,
    path: PathBuf,
    source: String,
    output: mpsc::Sender<Line>,
    cancel: CancellationToken,
) {
    let Some(_permit) = job
        .shared
        .pools
        .acquire(job.mode, &path, &job.messenger, &cancel)
        .await
    else {
        return;
    };
    let source: Arc<str> = Arc::from(source);
    let mut settings = ReaderSettings {
        mode: job.mode,
        seek_end: job.mode.is_tail(),
        max_line_length: job.shared.config.server.max_line_length,
        eof_poll: job.shared.timing.eof_poll,
        truncate_check: job.shared.timing.truncate_check,
    };

    loop {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_BUFFER);
        let filter = LineFilter::new(
            job.regex.clone(),
            Arc::clone(&source),
            job.mode.is_tail(),
            job.context,
        );
        let filter = tokio::spawn(filter.run(raw_rx, output.clone(), cancel.clone()));
        let reader = {
            let path = path.clone();
            let messenger = job.messenger.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || read_lines(&path, settings, &raw_tx, &messenger, &cancel))
        };

        let outcome = reader.await;
        let stats = filter.await.unwrap_or_default();
        debug!(
            path = %path.display(),
            seen = stats.seen,
            transmitted = stats.transmitted,
            dropped = stats.dropped,
            "reader finished"
        );

        match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err @ ReadError::Truncated { .. })) => {
                job.messenger
                    .info(format!("{err}, reading it from the start"))
                    .await;
                settings.seek_end = false;
            }
            Ok(Err(err)) => {
                job.messenger.error(err.to_string()).await;
                if !job.mode.is_tail() {
                    return;
                }
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(job.shared.timing.tail_reopen_delay) => {}
                }
            }
            Err(err) => {
                error!(path = %path.display(), %err, "reader task failed");
                return;
            }
        }
        if cancel.is_cancelled() {
            return;
        }
    }
}
