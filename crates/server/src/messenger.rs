//! Server messages and the frame channel every task writes into.

use std::fmt;
use std::sync::Arc;

use protocol::{Frame, Options};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Severity prefix of a `SERVER|host|LEVEL|text` message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// Handle on a session's outgoing frames.
///
/// Quiet sessions only see errors. Serverless sessions see no server
/// messages at all; the text goes to the local log instead.
#[derive(Clone, Debug)]
pub(crate) struct Messenger {
    out: mpsc::Sender<Frame>,
    host: Arc<str>,
    quiet: bool,
    serverless: bool,
}

impl Messenger {
    pub(crate) fn new(out: mpsc::Sender<Frame>, host: Arc<str>) -> Self {
        Self {
            out,
            host,
            quiet: false,
            serverless: false,
        }
    }

    pub(crate) fn configure(&mut self, options: &Options) {
        self.quiet = options.quiet;
        self.serverless = options.serverless;
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    /// Queues a frame; `false` once the session writer is gone.
    pub(crate) async fn send(&self, frame: Frame) -> bool {
        self.out.send(frame).await.is_ok()
    }

    /// Whether every queued frame has been handed to the writer.
    pub(crate) fn is_idle(&self) -> bool {
        self.out.capacity() == self.out.max_capacity()
    }

    pub(crate) async fn info(&self, text: impl Into<String>) {
        self.message(Level::Info, text.into()).await;
    }

    pub(crate) async fn warn(&self, text: impl Into<String>) {
        self.message(Level::Warn, text.into()).await;
    }

    pub(crate) async fn error(&self, text: impl Into<String>) {
        self.message(Level::Error, text.into()).await;
    }

    /// For reader threads outside the runtime.
    pub(crate) fn warn_blocking(&self, text: impl Into<String>) {
        if let Some(frame) = self.frame(Level::Warn, text.into()) {
            let _ = self.out.blocking_send(frame);
        }
    }

    async fn message(&self, level: Level, text: String) {
        if let Some(frame) = self.frame(level, text) {
            let _ = self.out.send(frame).await;
        }
    }

    fn frame(&self, level: Level, text: String) -> Option<Frame> {
        if self.serverless {
            match level {
                Level::Info => info!("{text}"),
                Level::Warn => warn!("{text}"),
                Level::Error => error!("{text}"),
            }
            return None;
        }
        if self.quiet && level != Level::Error {
            return None;
        }
        Some(Frame::server(&*self.host, format!("{level}|{text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messenger() -> (Messenger, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(8);
        (Messenger::new(tx, Arc::from("web01")), rx)
    }

    #[tokio::test]
    async fn messages_carry_level_and_host() {
        let (messenger, mut rx) = messenger();
        messenger.warn("disk almost full").await;
        assert_eq!(
            rx.recv().await,
            Some(Frame::server("web01", "WARN|disk almost full"))
        );
    }

    #[tokio::test]
    async fn quiet_sessions_only_get_errors() {
        let (mut messenger, mut rx) = messenger();
        messenger.configure(&Options {
            quiet: true,
            ..Options::default()
        });
        messenger.info("hello").await;
        messenger.error("boom").await;
        assert_eq!(rx.recv().await, Some(Frame::server("web01", "ERROR|boom")));
        assert!(messenger.is_idle());
    }

    #[tokio::test]
    async fn serverless_sessions_log_locally() {
        let (mut messenger, mut rx) = messenger();
        messenger.configure(&Options {
            serverless: true,
            ..Options::default()
        });
        messenger.error("boom").await;
        drop(messenger);
        assert_eq!(rx.recv().await, None);
    }
}
