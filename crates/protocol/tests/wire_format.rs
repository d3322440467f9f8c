//! End-to-end framing over an in-memory duplex stream.

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use proptest::prelude::*;
use protocol::{
    Command, CommandCodec, Envelope, Frame, FrameCodec, Options, ReadMode, Request,
    SYN_CLOSE_CONNECTION, encode_envelope,
};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

#[tokio::test]
async fn frames_cross_a_duplex_stream_in_order() {
    let (client, server) = tokio::io::duplex(64);
    let mut writer = FramedWrite::new(server, FrameCodec::new());
    let mut reader = FramedRead::new(client, FrameCodec::new());

    let sent = vec![
        Frame::server("srv", "INFO|reading /var/log/app.log"),
        Frame::Line {
            host: "srv".to_owned(),
            percent: 100,
            count: 1,
            source: "app".to_owned(),
            content: Bytes::from_static(b"first line\n"),
        },
        Frame::hidden(SYN_CLOSE_CONNECTION),
    ];

    let expected = sent.clone();
    let producer = tokio::spawn(async move {
        for frame in sent {
            writer.send(frame).await.unwrap();
        }
    });

    let mut received = Vec::new();
    while received.len() < expected.len() {
        received.push(reader.next().await.unwrap().unwrap());
    }
    producer.await.unwrap();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn enveloped_commands_decode_back_to_commands() {
    let (client, server) = tokio::io::duplex(256);
    let mut writer = FramedWrite::new(client, CommandCodec::new());
    let mut reader = FramedRead::new(server, CommandCodec::new());

    let command = Command::new(
        Options {
            quiet: true,
            ..Options::default()
        },
        Request::Read {
            mode: ReadMode::Grep,
            glob: "/var/log/*.log".to_owned(),
            regex: "regex:default ERROR;WARN".to_owned(),
        },
    );
    writer
        .send(encode_envelope(&command.to_string()).as_str())
        .await
        .unwrap();

    let segment = reader.next().await.unwrap().unwrap();
    let envelope = Envelope::parse(&segment).unwrap();
    assert!(envelope.version.unwrap().is_compatible());
    let decoded: Command = envelope.payload.unwrap().parse().unwrap();
    assert_eq!(decoded, command);
}

fn glob_strategy() -> impl Strategy<Value = String> {
    "/[a-z]{1,8}(/[a-z*]{1,8}){0,3}"
}

proptest! {
    #[test]
    fn read_commands_survive_text_round_trip(
        glob in glob_strategy(),
        pattern in "[ -~]{0,40}",
        before in 0usize..5,
        after in 0usize..5,
        max_count in 0usize..5,
        spartan: bool,
    ) {
        let command = Command::new(
            Options { spartan, before, after, max_count, ..Options::default() },
            Request::Read {
                mode: ReadMode::Tail,
                glob,
                regex: format!("regex:default {pattern}"),
            },
        );
        let parsed: Command = command.to_string().parse().unwrap();
        prop_assert_eq!(parsed, command);
    }

    #[test]
    fn line_content_is_carried_byte_for_byte(
        lines in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
    ) {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let frames: Vec<Frame> = (1_u64..)
            .zip(lines)
            .map(|(count, content)| Frame::Line {
                host: "srv".to_owned(),
                percent: 100,
                count,
                source: "app".to_owned(),
                content: Bytes::from(content),
            })
            .collect();
        for frame in &frames {
            codec.encode(frame.clone(), &mut buf).unwrap();
        }
        for frame in frames {
            prop_assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame));
        }
        prop_assert!(buf.is_empty());
    }
}
