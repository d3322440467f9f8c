//! The `run` verb: execute a program and stream its output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use config::{PermissionKind, PermissionSet};
use filters::Line;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::messenger::Messenger;

/// Resolves `program` the way a shell would: names containing `/` are
/// taken as they are, bare names are searched in `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// How long a program may keep running after closing both output streams.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Runs `command_line` in its own process group, sending stdout and stderr
/// lines to `output` tagged `STDOUT` and `STDERR`. The program is executed
/// directly, without a shell, and its arguments are split on whitespace.
///
/// Once both streams end the program gets [`EXIT_GRACE`] to exit; the
/// group is killed after that, or as soon as `cancel` fires.
pub(crate) async fn run_command(
    command_line: String,
    permissions: Arc<PermissionSet>,
    output: mpsc::Sender<Line>,
    messenger: Messenger,
    cancel: CancellationToken,
) {
    let mut words = command_line.split_whitespace();
    let Some(program) = words.next() else {
        messenger.error("run: empty command").await;
        return;
    };
    let args: Vec<&str> = words.collect();
    let Some(resolved) = resolve_program(program) else {
        messenger.error(format!("run: {program} not found in PATH")).await;
        return;
    };

    let mut subject = resolved.to_string_lossy().into_owned();
    for arg in &args {
        subject.push(' ');
        subject.push_str(arg);
    }
    if !permissions.allows(PermissionKind::RunCommands, &subject) {
        messenger.error(format!("no permission to run '{subject}'")).await;
        return;
    }

    let mut child = match Command::new(&resolved)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            messenger.error(format!("run: unable to start {subject}: {err}")).await;
            return;
        }
    };
    let group = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
    debug!(command = %subject, pid = ?group, "command started");

    let stdout = child.stdout.take().map(|out| forward(out, "STDOUT", output.clone()));
    let stderr = child.stderr.take().map(|err| forward(err, "STDERR", output.clone()));
    drop(output);
    let streams = async {
        if let Some(stdout) = stdout {
            let _ = stdout.await;
        }
        if let Some(stderr) = stderr {
            let _ = stderr.await;
        }
    };

    let cancelled = tokio::select! {
        () = cancel.cancelled() => true,
        () = streams => false,
    };
    if cancelled {
        kill_group(group);
        let _ = child.wait().await;
        return;
    }
    let waited = match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(waited) => waited,
        Err(_) => {
            debug!(command = %subject, "command outlived its output, killing it");
            kill_group(group);
            child.wait().await
        }
    };
    // Leftover members of the group, if any.
    kill_group(group);
    match waited {
        Ok(status) if status.success() => {}
        Ok(status) => messenger.warn(format!("run: {subject} exited with {status}")).await,
        Err(err) => messenger.error(format!("run: waiting for {subject}: {err}")).await,
    }
}

fn kill_group(group: Option<Pid>) {
    if let Some(group) = group {
        let _ = killpg(group, Signal::SIGKILL);
    }
}

fn forward<R>(reader: R, source: &'static str, output: mpsc::Sender<Line>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let source: Arc<str> = Arc::from(source);
        let mut reader = BufReader::new(reader);
        let mut count = 0_u64;
        loop {
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            count += 1;
            let line = Line {
                content: Bytes::from(buf),
                count,
                percent: 100,
                source: Arc::clone(&source),
            };
            if output.send(line).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use protocol::Frame;

    use super::*;

    fn allow_all() -> Arc<PermissionSet> {
        Arc::new(PermissionSet::compile(&["runcommands:.*"]).unwrap())
    }

    #[test]
    fn bare_names_resolve_through_path() {
        let sh = resolve_program("sh").unwrap();
        assert!(sh.is_absolute());
        assert_eq!(resolve_program("./x"), Some(PathBuf::from("./x")));
        assert!(resolve_program("definitely-not-a-real-program-xyz").is_none());
    }

    #[tokio::test]
    async fn output_is_tagged_by_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        let (frames_tx, _frames) = mpsc::channel(16);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        tokio::time::timeout(
            Duration::from_secs(10),
            run_command("echo hello".to_owned(), allow_all(), tx, messenger, CancellationToken::new()),
        )
        .await
        .unwrap();
        let line = rx.recv().await.unwrap();
        assert_eq!(&*line.source, "STDOUT");
        assert_eq!(&line.content[..], b"hello\n");
    }

    #[tokio::test]
    async fn denied_commands_do_not_run() {
        let (tx, mut rx) = mpsc::channel(16);
        let (frames_tx, mut frames) = mpsc::channel(16);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        let permissions = Arc::new(PermissionSet::compile(&["runcommands:^/nowhere/"]).unwrap());
        run_command("echo hi".to_owned(), permissions, tx, messenger, CancellationToken::new()).await;
        assert!(rx.recv().await.is_none());
        assert!(matches!(frames.recv().await, Some(Frame::Server { text, .. }) if text.starts_with("ERROR|no permission")));
    }

    async fn run_script(body: &str) -> (Vec<Line>, Vec<Frame>) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, body).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (frames_tx, mut frames) = mpsc::channel(16);
        let messenger = Messenger::new(frames_tx, Arc::from("h"));
        tokio::time::timeout(
            Duration::from_secs(10),
            run_command(format!("sh {}", script.display()), allow_all(), tx, messenger, CancellationToken::new()),
        )
        .await
        .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        let mut sent = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            sent.push(frame);
        }
        (lines, sent)
    }

    #[tokio::test]
    async fn exit_status_survives_closing_the_streams_early() {
        let (lines, frames) = run_script("echo early\nexec >&- 2>&-\nsleep 0.2\nexit 3\n").await;
        assert_eq!(lines.len(), 1);
        assert!(
            matches!(frames.as_slice(), [Frame::Server { text, .. }] if text.starts_with("WARN|") && text.ends_with("exit status: 3")),
            "{frames:?}"
        );
    }

    #[tokio::test]
    async fn quiet_exit_after_closing_the_streams_sends_nothing() {
        let (_, frames) = run_script("exec >&- 2>&-\nsleep 0.2\n").await;
        assert!(frames.is_empty(), "{frames:?}");
    }
}
