//! Map-reduce jobs the server runs against its own files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A query that runs once per day within an hour window.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ScheduledJob {
    /// Job name; also the SSH password the job authenticates with.
    pub name: String,
    /// Disabled jobs are ignored.
    pub enable: bool,
    /// Inclusive start and exclusive end hour, e.g. `[10, 14]`.
    pub time_range: [u8; 2],
    /// File glob to read.
    pub files: String,
    /// Map-reduce query; must carry an `outfile`.
    pub query: String,
    /// Comma separated servers, empty for the local server.
    pub servers: String,
    /// Discovery method, alternative to `servers`.
    pub discovery: String,
    /// Names or CIDRs allowed to authenticate as this job.
    pub allow_from: Vec<String>,
}

impl ScheduledJob {
    /// Whether `hour` falls inside the configured window.
    pub fn in_window(&self, hour: u8) -> bool {
        let [start, end] = self.time_range;
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    /// Resolves `$date` in an outfile path with `date` (`YYYYMMDD`).
    pub fn resolve_outfile(outfile: &Path, date: &str) -> PathBuf {
        PathBuf::from(outfile.to_string_lossy().replace("$date", date))
    }
}

/// A query that runs forever, restarting on failure.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContinuousJob {
    /// Job name; also the SSH password the job authenticates with.
    pub name: String,
    /// Disabled jobs are ignored.
    pub enable: bool,
    /// Restart the job when the calendar day changes.
    pub restart_on_day_change: bool,
    /// File glob to follow.
    pub files: String,
    /// Map-reduce query.
    pub query: String,
    /// Comma separated servers, empty for the local server.
    pub servers: String,
    /// Discovery method, alternative to `servers`.
    pub discovery: String,
    /// Names or CIDRs allowed to authenticate as this job.
    pub allow_from: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_half_open() {
        let job = ScheduledJob {
            time_range: [10, 14],
            ..ScheduledJob::default()
        };
        assert!(!job.in_window(9));
        assert!(job.in_window(10));
        assert!(job.in_window(13));
        assert!(!job.in_window(14));
    }

    #[test]
    fn window_may_wrap_midnight() {
        let job = ScheduledJob {
            time_range: [22, 2],
            ..ScheduledJob::default()
        };
        assert!(job.in_window(23));
        assert!(job.in_window(0));
        assert!(!job.in_window(2));
        assert!(!job.in_window(12));
    }

    #[test]
    fn outfile_date_placeholder() {
        let path = ScheduledJob::resolve_outfile(Path::new("/tmp/report.$date.csv"), "20240131");
        assert_eq!(path, PathBuf::from("/tmp/report.20240131.csv"));
    }
}
