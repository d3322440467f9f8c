//! Whole sessions against an in-process server.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use client::{ClientError, Handler, health_command, map_commands, read_commands, run_session};
use config::Config;
use filters::LineRegex;
use mapr::{GroupSet, Query};
use protocol::{Frame, Options, ReadMode};
use server::{Server, Timing};
use tokio_util::sync::CancellationToken;
use transport::{SessionInfo, SessionKind, connect_serverless};

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<Frame>>>);

impl Collect {
    fn frames(&self) -> Vec<Frame> {
        self.0.lock().unwrap().clone()
    }

    fn lines(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Line { content, .. } | Frame::Plain(content) => {
                    Some(String::from_utf8_lossy(&content).into_owned())
                }
                _ => None,
            })
            .collect()
    }

    fn messages(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Server { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Handler for Collect {
    async fn handle(&mut self, frame: Frame) -> Result<(), ClientError> {
        self.0.lock().unwrap().push(frame);
        Ok(())
    }
}

fn quick_timing() -> Timing {
    Timing {
        glob_retries: 1,
        glob_retry_interval: Duration::from_millis(10),
        eof_poll: Duration::from_millis(10),
        truncate_check: Duration::from_millis(50),
        tail_reopen_delay: Duration::from_millis(20),
        drain_attempts: 5,
        drain_interval: Duration::from_millis(10),
        ack_timeout: Duration::from_secs(1),
    }
}

fn server(config: Config) -> Arc<Server> {
    let mut config = config;
    config.common.hostname_override = Some("testhost".into());
    Arc::new(Server::with_timing(
        Arc::new(config),
        CancellationToken::new(),
        quick_timing(),
    ))
}

async fn session(server: &Arc<Server>, info: SessionInfo, commands: &[String], spartan: bool) -> Collect {
    let stream = connect_serverless(Arc::clone(server) as Arc<dyn transport::SessionHandler>, info);
    let mut collect = Collect::default();
    tokio::time::timeout(
        Duration::from_secs(10),
        run_session("serverless", stream, commands, spartan, &mut collect, &CancellationToken::new()),
    )
    .await
    .expect("session timed out")
    .unwrap();
    collect
}

fn write_log(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path.canonicalize().unwrap().display().to_string()
}

#[tokio::test]
async fn cat_streams_every_line_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_log(dir.path(), "app.log", "one\ntwo\nthree\n");
    let server = server(Config::default());
    let commands = read_commands(ReadMode::Cat, &file, &LineRegex::noop(), &Options::default());

    let collect = session(&server, SessionInfo::serverless("tester"), &commands, false).await;
    assert_eq!(collect.lines(), ["one\n", "two\n", "three\n"]);
    let counts: Vec<u64> = collect
        .frames()
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Line { host, count, .. } => {
                assert_eq!(host, "testhost");
                Some(count)
            }
            _ => None,
        })
        .collect();
    assert_eq!(counts, [1, 2, 3]);
}

#[tokio::test]
async fn spartan_cat_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let body = "alpha|beta\n\n  gamma delta\t\n";
    let file = write_log(dir.path(), "raw.log", body);
    let server = server(Config::default());
    let options = Options {
        spartan: true,
        quiet: true,
        ..Options::default()
    };
    let commands = read_commands(ReadMode::Cat, &file, &LineRegex::noop(), &options);

    let collect = session(&server, SessionInfo::serverless("tester"), &commands, true).await;
    assert_eq!(collect.lines().concat(), body);
}

#[tokio::test]
async fn grep_keeps_matching_lines_only() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_log(dir.path(), "app.log", "ok 1\nERROR 2\nok 3\nERROR 4\n");
    let server = server(Config::default());
    let regex: LineRegex = "regex:default ERROR".parse().unwrap();
    let commands = read_commands(ReadMode::Grep, &file, &regex, &Options::default());

    let collect = session(&server, SessionInfo::serverless("tester"), &commands, false).await;
    assert_eq!(collect.lines(), ["ERROR 2\n", "ERROR 4\n"]);
}

#[tokio::test]
async fn health_answers_ok() {
    let server = server(Config::default());
    let info = SessionInfo {
        user: transport::HEALTH_USER.into(),
        peer: None,
        kind: SessionKind::Health,
    };
    let collect = session(&server, info, &[health_command()], false).await;
    assert_eq!(collect.messages(), ["OK"]);
}

#[tokio::test]
async fn health_user_cannot_read_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_log(dir.path(), "app.log", "secret\n");
    let server = server(Config::default());
    let info = SessionInfo {
        user: transport::HEALTH_USER.into(),
        peer: None,
        kind: SessionKind::Health,
    };
    let commands = read_commands(ReadMode::Cat, &file, &LineRegex::noop(), &Options::default());
    let collect = session(&server, info, &commands, false).await;
    assert!(collect.lines().is_empty());
    assert!(collect.messages().iter().any(|m| m.starts_with("ERROR|")));
}

#[tokio::test]
async fn files_outside_the_permissions_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let allowed = write_log(dir.path(), "allowed.log", "visible\n");
    let denied = write_log(dir.path(), "denied.log", "hidden\n");
    let mut config = Config::default();
    config
        .server
        .permissions
        .users
        .insert("tester".into(), vec!["readfiles:^/".into(), "readfiles:!denied".into()]);
    let server = server(config);
    let files = format!("{allowed},{denied}");
    let commands = read_commands(ReadMode::Cat, &files, &LineRegex::noop(), &Options::default());

    let collect = session(&server, SessionInfo::serverless("tester"), &commands, false).await;
    assert_eq!(collect.lines(), ["visible\n"]);
    assert!(
        collect
            .messages()
            .iter()
            .any(|m| m.starts_with("ERROR|no permission to read") && m.ends_with("denied.log"))
    );
}

#[tokio::test]
async fn map_sends_partial_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::new();
    for (hour, connections) in [("07", 3), ("07", 5), ("08", 1)] {
        body.push_str(&format!(
            "INFO|20240101-{hour}0000|1|stats|4|10|0|0.1|60|MAPREDUCE:STATS|concurrentConnections={connections}|lifetimeConnections=9\n"
        ));
    }
    body.push_str("INFO|20240101-090000|not a stats line\n");
    let file = write_log(dir.path(), "dserver.log", &body);
    let server = server(Config::default());
    let query = Query::parse(
        "from STATS select $hour,count($line),max(concurrentConnections) group by $hour order by count($line)",
    )
    .unwrap();
    let commands = map_commands(&query, ReadMode::Cat, &file, None, &Options::default()).unwrap();

    let collect = session(&server, SessionInfo::serverless("tester"), &commands, false).await;
    assert!(collect.lines().is_empty());
    let mut merged = GroupSet::new();
    for frame in collect.frames() {
        if let Frame::Aggregate { payload, .. } = frame {
            merged.merge_serialized(&query, &payload).unwrap();
        }
    }
    assert_eq!(merged.rows(&query), [["07", "2", "5"], ["08", "1", "1"]]);
}
