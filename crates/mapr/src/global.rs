//! The client-wide result merged from every server's partials.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AggregateError, OutputError};
use crate::group::GroupSet;
use crate::query::Query;

/// Suffix of the file holding the raw query next to an outfile.
pub const QUERY_SIDECAR_SUFFIX: &str = ".query";

/// Merged result of a client run.
///
/// Merges are serialised by a single-slot lock that only guards
/// in-memory folding; [`GlobalGroupSet::merge_noblock`] never waits for it.
#[derive(Debug)]
pub struct GlobalGroupSet {
    query: Arc<Query>,
    inner: Mutex<GroupSet>,
}

impl GlobalGroupSet {
    /// An empty result for `query`.
    pub fn new(query: Arc<Query>) -> Self {
        Self {
            query,
            inner: Mutex::new(GroupSet::new()),
        }
    }

    /// The query this result belongs to.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Folds `local` in if the lock is free, leaving `local` empty.
    /// Returns `Ok(false)` without touching `local` when another merge is
    /// in progress.
    ///
    /// # Errors
    ///
    /// Fails when slot types disagree.
    pub fn merge_noblock(&self, local: &mut GroupSet) -> Result<bool, AggregateError> {
        let Ok(mut global) = self.inner.try_lock() else {
            return Ok(false);
        };
        global.merge(&self.query, local)?;
        *local = GroupSet::new();
        Ok(true)
    }

    /// Folds `local` in, waiting for the lock.
    ///
    /// # Errors
    ///
    /// Fails when slot types disagree.
    pub async fn merge(&self, local: &GroupSet) -> Result<(), AggregateError> {
        self.inner.lock().await.merge(&self.query, local)
    }

    /// Takes the current result and starts over with an empty one.
    pub async fn swap_out(&self) -> GroupSet {
        mem::take(&mut *self.inner.lock().await)
    }

    /// A copy of the current result.
    pub async fn snapshot(&self) -> GroupSet {
        self.inner.lock().await.clone()
    }

    /// Whether nothing has been merged yet.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Terminal rendering of `set`.
    pub fn render(&self, set: &GroupSet) -> String {
        set.render_table(&self.query)
    }

    /// Writes `set` to the query's outfile, if it has one.
    ///
    /// Replacing writes go through `PATH.tmp` and a rename; appending
    /// opens the file directly and writes the header only into an empty
    /// file. The raw query lands in `PATH.query` the same way.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] naming the file that failed.
    pub async fn write_outfile(&self, set: &GroupSet) -> Result<Option<PathBuf>, OutputError> {
        let Some(outfile) = &self.query.outfile else {
            return Ok(None);
        };
        let path = outfile.path.clone();

        if outfile.append {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|source| io_error(&path, source))?;
            let empty = file
                .metadata()
                .await
                .map_err(|source| io_error(&path, source))?
                .len()
                == 0;
            let body = if empty {
                set.to_csv(&self.query)
            } else {
                set.csv_rows(&self.query)
            };
            file.write_all(body.as_bytes())
                .await
                .map_err(|source| io_error(&path, source))?;
            file.flush().await.map_err(|source| io_error(&path, source))?;
        } else {
            replace_atomically(&path, set.to_csv(&self.query).as_bytes()).await?;
        }

        let sidecar = sidecar_path(&path);
        let mut raw = self.query.raw().to_owned();
        raw.push('\n');
        replace_atomically(&sidecar, raw.as_bytes()).await?;
        debug!(path = %path.display(), groups = set.len(), "wrote mapreduce result");
        Ok(Some(path))
    }
}

/// `PATH.query` next to `path`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    append_suffix(path, QUERY_SIDECAR_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> OutputError {
    OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn replace_atomically(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let tmp = append_suffix(path, ".tmp");
    fs::write(&tmp, contents)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|source| io_error(path, source))
}
