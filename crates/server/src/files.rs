//! Glob expansion with retries, and the per-file source id.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::messenger::Messenger;
use crate::server::Timing;

const WILDCARDS: &[char] = &['*', '?', '['];

/// Regular files matching `pattern`, canonicalised and sorted.
pub fn expand_once(pattern: &str) -> Vec<PathBuf> {
    let Ok(paths) = glob::glob(pattern) else {
        return Vec::new();
    };
    paths
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter_map(|path| path.canonicalize().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Expands `pattern`, retrying while nothing matches. Returns an empty list
/// when the retries run out or `cancel` fires.
pub(crate) async fn expand(
    pattern: &str,
    timing: &Timing,
    messenger: &Messenger,
    cancel: &CancellationToken,
) -> Vec<PathBuf> {
    for attempt in 0..=timing.glob_retries {
        let paths = expand_once(pattern);
        if !paths.is_empty() {
            debug!(pattern, files = paths.len(), "glob expanded");
            return paths;
        }
        if attempt == timing.glob_retries {
            break;
        }
        messenger
            .warn(format!(
                "no file matches '{pattern}', retrying in {}s",
                timing.glob_retry_interval.as_secs()
            ))
            .await;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(timing.glob_retry_interval) => {}
        }
    }
    Vec::new()
}

/// Source id of `path` as matched by `pattern`: the path components that
/// matched wildcards, followed by the file name.
///
/// ```
/// use std::path::Path;
///
/// let id = server::glob_id("/var/log/*/app.log", Path::new("/var/log/web1/app.log"));
/// assert_eq!(id, "web1/app.log");
/// ```
pub fn glob_id(pattern: &str, path: &Path) -> String {
    let names = |p: &Path| -> Vec<String> {
        p.components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    };
    let pattern_parts = names(Path::new(pattern));
    let path_parts = names(path);

    let mut picked = Vec::new();
    for (i, (pat, name)) in pattern_parts.iter().rev().zip(path_parts.iter().rev()).enumerate() {
        if i == 0 || pat.contains(WILDCARDS) {
            picked.push(name.clone());
        }
    }
    if picked.is_empty() {
        return path.file_name().map_or_else(
            || path.to_string_lossy().into_owned(),
            |name| name.to_string_lossy().into_owned(),
        );
    }
    picked.reverse();
    picked.join("/")
}
