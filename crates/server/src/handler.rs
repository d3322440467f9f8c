//! One session: command dispatch, the frame writer and the closing
//! handshake.

use std::sync::Arc;

use config::PermissionSet;
use filters::{ContextOptions, LineRegex};
use futures::{SinkExt, StreamExt};
use mapr::{DEFAULT_LOG_FORMAT, Query};
use protocol::{
    ACK_CLOSE_CONNECTION, Command, CommandCodec, Envelope, Frame, FrameCodec, Options, Request,
    SYN_CLOSE_CONNECTION,
};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use transport::{BoxedStream, SessionInfo, SessionKind};

use crate::map::Aggregate;
use crate::messenger::Messenger;
use crate::read::{self, LineSink, ReadJob};
use crate::run;
use crate::server::Shared;

const OUTPUT_BUFFER: usize = 1024;

type Commands = FramedRead<ReadHalf<BoxedStream>, CommandCodec>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Flow {
    Continue,
    /// Run the closing handshake, then end the session.
    Finish,
    /// End the session now.
    Close,
}

pub(crate) async fn serve_session(shared: Arc<Shared>, stream: BoxedStream, info: SessionInfo) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut commands = FramedRead::new(read_half, CommandCodec::new());
    let cancel = shared.shutdown.child_token();

    let first = tokio::select! {
        () = cancel.cancelled() => return,
        segment = commands.next() => match segment {
            Some(Ok(segment)) => segment,
            Some(Err(err)) => {
                debug!(user = %info.user, %err, "unable to read the first command");
                return;
            }
            None => return,
        },
    };
    let legacy_newline = Envelope::parse(&first)
        .ok()
        .and_then(|envelope| envelope.version)
        .is_some_and(|version| version.expects_newline());

    let (out_tx, out_rx) = mpsc::channel(OUTPUT_BUFFER);
    let writer = tokio::spawn(write_frames(write_half, out_rx, legacy_newline));
    let messenger = Messenger::new(out_tx, Arc::clone(&shared.hostname));

    let mut session = Session {
        shared,
        info,
        messenger,
        cancel,
        options: None,
        permissions: None,
        tasks: JoinSet::new(),
        aggregate: None,
    };
    session.run(first, commands).await;
    drop(session);
    let _ = writer.await;
}

async fn write_frames(write_half: WriteHalf<BoxedStream>, mut frames: mpsc::Receiver<Frame>, legacy_newline: bool) {
    let mut sink = FramedWrite::new(write_half, FrameCodec::new().legacy_newline(legacy_newline));
    while let Some(frame) = frames.recv().await {
        if let Err(err) = sink.feed(frame).await {
            debug!(%err, "session writer failed");
            return;
        }
        if frames.is_empty() && sink.flush().await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}

struct Session {
    shared: Arc<Shared>,
    info: SessionInfo,
    messenger: Messenger,
    cancel: CancellationToken,
    options: Option<Options>,
    permissions: Option<Arc<PermissionSet>>,
    tasks: JoinSet<()>,
    aggregate: Option<Aggregate>,
}

impl Session {
    async fn run(&mut self, first: String, mut commands: Commands) {
        let mut flow = self.handle_segment(&first).await;
        while flow == Flow::Continue {
            flow = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Flow::Close,
                segment = commands.next() => match segment {
                    Some(Ok(segment)) => self.handle_segment(&segment).await,
                    Some(Err(err)) => {
                        debug!(user = %self.info.user, %err, "command stream failed");
                        Flow::Close
                    }
                    None => {
                        debug!(user = %self.info.user, "client went away");
                        Flow::Close
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!(user = %self.info.user, "session task panicked");
                        }
                    }
                    if self.tasks.is_empty() { Flow::Finish } else { Flow::Continue }
                }
            };
        }

        if flow == Flow::Finish {
            self.finish(&mut commands).await;
        }
        self.cancel.cancel();
        self.tasks.shutdown().await;
        if let Some(aggregate) = self.aggregate.take() {
            aggregate.abort();
        }
        debug!(user = %self.info.user, "session ended");
    }

    /// Final aggregate flush, output drain, then `.syn close connection`
    /// and a bounded wait for the acknowledgement.
    async fn finish(&mut self, commands: &mut Commands) {
        if let Some(aggregate) = self.aggregate.take() {
            aggregate.finish().await;
        }
        let timing = self.shared.timing;
        for _ in 0..timing.drain_attempts {
            if self.messenger.is_idle() {
                break;
            }
            tokio::time::sleep(timing.drain_interval).await;
        }
        if !self.messenger.send(Frame::hidden(SYN_CLOSE_CONNECTION)).await {
            return;
        }
        let acknowledged = async {
            while let Some(Ok(segment)) = commands.next().await {
                if is_ack(&segment) {
                    return true;
                }
            }
            false
        };
        match tokio::time::timeout(timing.ack_timeout, acknowledged).await {
            Ok(true) => debug!(user = %self.info.user, "close acknowledged"),
            _ => debug!(user = %self.info.user, "no close acknowledgement, closing anyway"),
        }
    }

    async fn handle_segment(&mut self, segment: &str) -> Flow {
        let envelope = match Envelope::parse(segment) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.messenger.error(format!("unable to decode command: {err}")).await;
                return Flow::Finish;
            }
        };
        if let Some(version) = &envelope.version {
            if !version.is_compatible() {
                self.messenger.error(version.mismatch_message()).await;
                return Flow::Finish;
            }
        }
        let Some(payload) = envelope.payload else {
            return Flow::Continue;
        };
        let command = match payload.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                self.messenger
                    .warn(format!("unable to handle command '{payload}': {err}"))
                    .await;
                return Flow::Finish;
            }
        };
        if self.options.is_none() {
            self.messenger.configure(&command.options);
            self.options = Some(command.options.clone());
        }
        if self.info.kind == SessionKind::Health
            && !matches!(command.request, Request::Health | Request::AckClose)
        {
            self.messenger
                .error("the health user may only run health checks")
                .await;
            return Flow::Finish;
        }
        info!(user = %self.info.user, verb = command.request.verb(), "handling command");
        self.dispatch(command).await
    }

    async fn dispatch(&mut self, command: Command) -> Flow {
        let options = self.options.clone().unwrap_or_default();
        match command.request {
            Request::Health => {
                self.messenger
                    .send(Frame::server(self.messenger.host(), "OK"))
                    .await;
                Flow::Finish
            }
            Request::AckClose => Flow::Close,
            Request::Map { query } => self.install_aggregate(&query).await,
            Request::Read { mode, glob, regex } => {
                let regex = match regex.parse::<LineRegex>() {
                    Ok(regex) => regex,
                    Err(err) => {
                        self.messenger.error(format!("invalid regex: {err}")).await;
                        return self.finish_when_idle();
                    }
                };
                let Some(permissions) = self.permissions().await else {
                    return self.finish_when_idle();
                };
                let sink = match &self.aggregate {
                    Some(aggregate) => LineSink::Aggregate(aggregate.sender()),
                    None => LineSink::Frames {
                        spartan: options.spartan,
                    },
                };
                let job = ReadJob {
                    shared: Arc::clone(&self.shared),
                    messenger: self.messenger.clone(),
                    permissions,
                    mode,
                    glob,
                    regex,
                    context: ContextOptions {
                        before: options.before,
                        after: options.after,
                        max_count: options.max_count,
                    },
                    sink,
                };
                self.tasks.spawn(read::read_glob(job, self.cancel.child_token()));
                Flow::Continue
            }
            Request::Run { command } => {
                let Some(permissions) = self.permissions().await else {
                    return self.finish_when_idle();
                };
                let (output, forwarder) = match &self.aggregate {
                    Some(aggregate) => (aggregate.sender(), None),
                    None => {
                        let (tx, handle) = read::spawn_forwarder(self.messenger.clone(), options.spartan);
                        (tx, Some(handle))
                    }
                };
                let messenger = self.messenger.clone();
                let cancel = self.cancel.child_token();
                self.tasks.spawn(async move {
                    run::run_command(command, permissions, output, messenger, cancel).await;
                    if let Some(forwarder) = forwarder {
                        let _ = forwarder.await;
                    }
                });
                Flow::Continue
            }
        }
    }

    async fn install_aggregate(&mut self, raw: &str) -> Flow {
        let query = match Query::parse(raw) {
            Ok(query) => Arc::new(query),
            Err(err) => {
                self.messenger.error(format!("invalid query: {err}")).await;
                return self.finish_when_idle();
            }
        };
        let log_format = if query.log_format == DEFAULT_LOG_FORMAT {
            self.shared.config.server.mapr_log_format.clone()
        } else {
            query.log_format.clone()
        };
        match Aggregate::spawn(
            query,
            &log_format,
            &self.shared.hostname,
            self.messenger.clone(),
            self.cancel.child_token(),
        ) {
            Ok(aggregate) => {
                if let Some(previous) = self.aggregate.replace(aggregate) {
                    previous.abort();
                }
                Flow::Continue
            }
            Err(err) => {
                self.messenger.error(format!("invalid query: {err}")).await;
                self.finish_when_idle()
            }
        }
    }

    async fn permissions(&mut self) -> Option<Arc<PermissionSet>> {
        if let Some(permissions) = &self.permissions {
            return Some(Arc::clone(permissions));
        }
        match self.shared.config.server.permissions.for_user(&self.info.user) {
            Ok(set) => {
                let set = Arc::new(set);
                self.permissions = Some(Arc::clone(&set));
                Some(set)
            }
            Err(err) => {
                self.messenger
                    .error(format!("unable to load permissions: {err}"))
                    .await;
                None
            }
        }
    }

    fn finish_when_idle(&self) -> Flow {
        if self.tasks.is_empty() {
            Flow::Finish
        } else {
            Flow::Continue
        }
    }
}

fn is_ack(segment: &str) -> bool {
    Envelope::parse(segment)
        .ok()
        .and_then(|envelope| envelope.payload)
        .is_some_and(|payload| payload.trim() == ACK_CLOSE_CONNECTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgements_are_recognised() {
        assert!(is_ack(protocol::encode_envelope(ACK_CLOSE_CONNECTION).trim_end_matches(';')));
        assert!(!is_ack(protocol::encode_envelope("health").trim_end_matches(';')));
        assert!(!is_ack("garbage"));
    }
}
