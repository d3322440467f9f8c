//! Client side of one session: send the commands, hand frames to the
//! handler, acknowledge the server's close.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use protocol::{ACK_CLOSE_CONNECTION, CommandCodec, Frame, FrameCodec, SYN_CLOSE_CONNECTION, encode_envelope};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use transport::BoxedStream;

use crate::error::ClientError;
use crate::handler::Handler;

/// Limit for writing one command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one session until the server closes it, the stream ends or
/// `cancel` fires. `commands` are already enveloped.
///
/// # Errors
///
/// Fails when a command cannot be sent in time, the stream carries an
/// undecodable frame, or the handler fails.
pub async fn run_session(
    server: &str,
    stream: BoxedStream,
    commands: &[String],
    spartan: bool,
    handler: &mut dyn Handler,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut frames = FramedRead::new(read_half, FrameCodec::new().spartan(spartan));
    let mut writer = FramedWrite::new(write_half, CommandCodec::new());

    for command in commands {
        match tokio::time::timeout(COMMAND_TIMEOUT, writer.send(command.as_str())).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(ClientError::CommandTimeout(server.to_owned())),
        }
    }
    debug!(server, commands = commands.len(), "commands sent");

    let result = loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            frame = frames.next() => frame,
        };
        match frame {
            None => break Ok(()),
            Some(Err(err)) => break Err(err.into()),
            Some(Ok(Frame::Hidden(text))) => {
                if text == SYN_CLOSE_CONNECTION {
                    let ack = encode_envelope(ACK_CLOSE_CONNECTION);
                    let _ = tokio::time::timeout(COMMAND_TIMEOUT, writer.send(ack.as_str())).await;
                    break Ok(());
                }
                debug!(server, %text, "ignoring control message");
            }
            Some(Ok(frame)) => {
                if let Err(err) = handler.handle(frame).await {
                    break Err(err);
                }
            }
        }
    };

    let _ = writer.close().await;
    let finished = handler.finish().await;
    result.and(finished)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use protocol::Envelope;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[derive(Default)]
    struct Collect(Arc<Mutex<Vec<Frame>>>);

    #[async_trait]
    impl Handler for Collect {
        async fn handle(&mut self, frame: Frame) -> Result<(), ClientError> {
            self.0.lock().unwrap().push(frame);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sends_commands_and_acknowledges_close() {
        let (client, server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut commands = FramedRead::new(read_half, CommandCodec::new());
            let first = commands.next().await.unwrap().unwrap();
            assert_eq!(Envelope::parse(&first).unwrap().payload.as_deref(), Some("health"));
            write_half.write_all(b"SERVER|h|OK\xac.syn close connection\xac").await.unwrap();
            let ack = commands.next().await.unwrap().unwrap();
            Envelope::parse(&ack).unwrap().payload
        });

        let frames = Arc::new(Mutex::new(Vec::new()));
        let mut handler = Collect(Arc::clone(&frames));
        run_session(
            "h",
            Box::pin(client),
            &[encode_envelope("health")],
            false,
            &mut handler,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(server_task.await.unwrap().as_deref(), Some(ACK_CLOSE_CONNECTION));
        assert_eq!(*frames.lock().unwrap(), [Frame::server("h", "OK")]);
    }
}
