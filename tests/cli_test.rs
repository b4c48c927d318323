// ABOUTME: Tests for the change-exporter binary command line
// ABOUTME: Checks flag parsing, auth validation and startup failure handling

use std::process::Command;

fn exporter() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_change-exporter"));
    for var in [
        "CHANGE_EXPORTER_LISTEN_USERNAME",
        "CHANGE_EXPORTER_LISTEN_PASSWORD",
        "CHANGE_EXPORTER_DB_HOST",
        "CHANGE_EXPORTER_DB_USERNAME",
        "CHANGE_EXPORTER_DB_PASSWORD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn test_help_lists_flags() {
    let output = exporter().arg("--help").output().expect("Failed to execute command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--listen-address",
        "--listen-port",
        "--listen-username",
        "--listen-password",
        "--db-host",
        "--db-port",
        "--db-username",
        "--db-password",
        "--debug",
    ] {
        assert!(stdout.contains(flag), "missing {flag} in help");
    }
}

#[test]
fn test_db_host_is_required() {
    let output = exporter().output().expect("Failed to execute command");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--db-host"));
}

#[test]
fn test_listen_username_requires_password() {
    let output = exporter()
        .args(["--db-host", "127.0.0.1", "--listen-username", "reader"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--listen-username requires --listen-password"));
}

#[test]
fn test_unreachable_database_exits_with_failure() {
    let output = exporter()
        .args(["--db-host", "127.0.0.1", "--db-port", "1", "--listen-port", "0"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Failed to connect to MySQL at 127.0.0.1:1"));
}
