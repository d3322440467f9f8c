use std::io::Write;
use std::path::Path;

use config::{Config, ConfigError, PermissionKind};
use logging::LogLevel;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn partial_file_keeps_defaults_for_missing_keys() {
    let file = write_config(
        r#"{
            "Common": { "SSHPort": 4242, "LogLevel": "debug" },
            "Server": {
                "SSHBindAddress": "127.0.0.1",
                "Permissions": {
                    "Default": ["readfiles:^/var/log/"],
                    "Users": { "ops": ["^/", "runcommands:^/usr/bin/"] }
                },
                "Schedule": [{
                    "Name": "hourly",
                    "Enable": true,
                    "TimeRange": [0, 24],
                    "Files": "/var/log/app/*.log",
                    "Query": "from STATS select count($line) group by $hostname outfile /tmp/x.csv",
                    "AllowFrom": ["127.0.0.1/32"]
                }]
            }
        }"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.common.ssh_port, 4242);
    assert_eq!(config.common.log_level, LogLevel::Debug);
    assert_eq!(config.server.ssh_bind_address, "127.0.0.1");
    assert_eq!(config.server.max_connections, 50);
    assert_eq!(config.client.stats_interval_secs, 5);
    assert_eq!(config.server.schedule.len(), 1);
    assert!(config.server.schedule[0].in_window(23));

    let ops = config.server.permissions.for_user("ops").unwrap();
    assert!(ops.allows(PermissionKind::RunCommands, "/usr/bin/uptime"));
    let other = config.server.permissions.for_user("guest").unwrap();
    assert!(!other.allows(PermissionKind::ReadFiles, "/etc/passwd"));
}

#[test]
fn none_path_skips_the_file() {
    let config = Config::load(Some(Path::new("none"))).unwrap();
    assert_eq!(config.server.max_concurrent_cats, 2);
}

#[test]
fn malformed_json_names_the_file() {
    let file = write_config("{ not json");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Config::from_file(Path::new("/nonexistent/dtail.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
