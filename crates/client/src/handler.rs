//! What a session does with the frames it receives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::BytesMut;
use protocol::Frame;
use tracing::debug;

use crate::error::ClientError;
use crate::output::Printer;

/// Consumes the frames of one session. Control frames never reach it.
#[async_trait]
pub trait Handler: Send {
    /// Handles one frame.
    async fn handle(&mut self, frame: Frame) -> Result<(), ClientError>;

    /// Called once when the session ends, successfully or not.
    async fn finish(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Builds a fresh handler for every connection attempt to the named server.
pub type HandlerFactory = Arc<dyn Fn(&str) -> Box<dyn Handler> + Send + Sync>;

/// Prints lines to stdout and server messages to stderr.
#[derive(Clone, Debug)]
pub struct BaseHandler {
    server: String,
    printer: Printer,
}

impl BaseHandler {
    /// A handler for frames from `server`.
    pub fn new(server: impl Into<String>, printer: Printer) -> Self {
        Self {
            server: server.into(),
            printer,
        }
    }
}

#[async_trait]
impl Handler for BaseHandler {
    async fn handle(&mut self, frame: Frame) -> Result<(), ClientError> {
        match frame {
            Frame::Plain(content) => self.printer.content(&content)?,
            line @ Frame::Line { .. } => {
                let mut buf = BytesMut::new();
                line.encode_into(&mut buf);
                if !buf.ends_with(b"\n") {
                    buf.extend_from_slice(b"\n");
                }
                self.printer.content(&buf)?;
            }
            Frame::Server { host, text } => self.printer.message(&format!("SERVER|{host}|{text}"))?,
            Frame::Aggregate { .. } | Frame::Hidden(_) => {
                debug!(server = %self.server, "ignoring frame without a printable form");
            }
        }
        Ok(())
    }
}

/// Outcome of health checks, shared by their handlers.
#[derive(Debug, Default)]
pub struct HealthStatus {
    ok: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl HealthStatus {
    /// Whether a server answered `OK`.
    pub fn is_ok(&self) -> bool {
        self.ok.load(Ordering::Relaxed)
    }

    /// Every other server message received.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

/// Records the server's answer to `health`.
#[derive(Debug)]
pub struct HealthHandler {
    status: Arc<HealthStatus>,
}

impl HealthHandler {
    /// A handler reporting into `status`.
    pub fn new(status: Arc<HealthStatus>) -> Self {
        Self { status }
    }
}

#[async_trait]
impl Handler for HealthHandler {
    async fn handle(&mut self, frame: Frame) -> Result<(), ClientError> {
        if let Frame::Server { text, .. } = frame {
            if text == "OK" {
                self.status.ok.store(true, Ordering::Relaxed);
            } else if let Ok(mut messages) = self.status.messages.lock() {
                messages.push(text);
            }
        }
        Ok(())
    }
}
