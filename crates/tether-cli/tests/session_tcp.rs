//! End-to-end sessions against a local TCP peer.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

const SETTLE: Duration = Duration::from_millis(200);

fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

/// Starts the client with stdin held open so EOF does not end the session.
fn spawn_client(home: &TempDir, port: u16, extra: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_tether"))
        .env("TETHER_HOME", home.path())
        .env_remove("TETHER_HOST")
        .env_remove("TETHER_PORT")
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(extra)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap()
}

#[test]
fn test_peer_messages_are_shown_and_heartbeats_hidden() {
    let home = tempdir().unwrap();
    let (listener, port) = listen();

    let peer = thread::spawn(move || {
        let mut stream = accept(&listener);
        stream.write_all(b"__ping__").unwrap();
        thread::sleep(SETTLE);
        stream.write_all(b"hi").unwrap();
        thread::sleep(SETTLE);
    });

    let mut child = spawn_client(&home, port, &["--no-heartbeat"]);
    let stdin = child.stdin.take().unwrap();
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut stdout)
        .unwrap();
    drop(stdin);
    let status = child.wait().unwrap();
    peer.join().unwrap();

    assert!(status.success());
    assert!(stdout.contains(&format!("Connected to server(127.0.0.1:{port})")));
    assert!(stdout.contains("Received: hi"));
    assert!(stdout.contains("Connection closed by server."));
    assert!(!stdout.contains("__ping__"));
}

#[test]
fn test_operator_message_round_trip_then_quit() {
    let home = tempdir().unwrap();
    let (listener, port) = listen();

    let peer = thread::spawn(move || {
        let mut stream = accept(&listener);
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).unwrap();
        let mut reply = b"echo: ".to_vec();
        reply.extend_from_slice(&buf[..n]);
        stream.write_all(&reply).unwrap();

        // The client closes its side after the quit keyword.
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 0, "nothing is sent after quit");
        String::from_utf8_lossy(&reply).into_owned()
    });

    let mut child = spawn_client(&home, port, &["--no-heartbeat"]);
    let mut stdin = child.stdin.take().unwrap();
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();

    let connected = lines.next().unwrap().unwrap();
    assert!(connected.starts_with("Connected to server"));

    writeln!(stdin, "hello").unwrap();
    assert_eq!(lines.next().unwrap().unwrap(), "Sent: hello");
    assert_eq!(lines.next().unwrap().unwrap(), "Received: echo: hello");

    writeln!(stdin, "EXIT").unwrap();
    assert_eq!(lines.next().unwrap().unwrap(), "bye");

    let status = child.wait().unwrap();
    assert!(status.success());
    assert_eq!(peer.join().unwrap(), "echo: hello");
}

#[test]
fn test_idle_client_sends_heartbeat() {
    let home = tempdir().unwrap();
    let (listener, port) = listen();

    let peer = thread::spawn(move || {
        let mut stream = accept(&listener);
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).unwrap();
        buf
    });

    let mut child = spawn_client(&home, port, &["--heartbeat-interval", "0.2"]);
    let stdin = child.stdin.take().unwrap();

    let probe = peer.join().unwrap();
    assert_eq!(&probe, b"__ping__");

    // Peer is gone (stream dropped with the thread); the client exits on its own.
    let status = child.wait().unwrap();
    drop(stdin);
    assert!(status.success());
}

#[test]
fn test_json_output_mode() {
    let home = tempdir().unwrap();
    let (listener, port) = listen();

    let peer = thread::spawn(move || {
        let mut stream = accept(&listener);
        stream.write_all(b"hi").unwrap();
        thread::sleep(SETTLE);
    });

    let mut child = spawn_client(&home, port, &["--no-heartbeat", "--output", "json"]);
    let stdin = child.stdin.take().unwrap();
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut stdout)
        .unwrap();
    drop(stdin);
    child.wait().unwrap();
    peer.join().unwrap();

    let types: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(types, vec!["connected", "received", "peer_closed"]);
}

#[test]
fn test_connect_failure_is_reported() {
    let home = tempdir().unwrap();
    let (listener, port) = listen();
    drop(listener);

    cargo_bin_cmd!("tether")
        .env("TETHER_HOME", home.path())
        .env_remove("TETHER_HOST")
        .env_remove("TETHER_PORT")
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .write_stdin("")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(format!(
            "Cannot connect to server 127.0.0.1:{port}"
        )));
}

/// Sends `signal` once the session is up and checks it ends within a cycle,
/// exits 130 and leaves only heartbeats followed by EOF on the wire.
#[cfg(unix)]
fn assert_signal_stops_session(signal: libc::c_int, extra: &[&str]) {
    let home = tempdir().unwrap();
    let (listener, port) = listen();

    let mut child = spawn_client(&home, port, extra);
    let mut stream = accept(&listener);
    let _stdin = child.stdin.take().unwrap();
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    assert!(lines.next().unwrap().unwrap().starts_with("Connected to server"));

    let pid = libc::pid_t::try_from(child.id()).unwrap();
    let sent_at = Instant::now();
    // SAFETY: signals a child process this test owns and has not reaped.
    assert_eq!(unsafe { libc::kill(pid, signal) }, 0);

    let status = child.wait().unwrap();
    assert!(
        sent_at.elapsed() < Duration::from_secs(3),
        "session took {:?} to stop",
        sent_at.elapsed()
    );
    assert_eq!(status.code(), Some(130));

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert_eq!(rest.len() % 8, 0, "unexpected bytes: {rest:?}");
    assert!(rest.chunks(8).all(|chunk| chunk == b"__ping__"));
}

#[cfg(unix)]
#[test]
fn test_sigterm_ends_session_within_a_heartbeat_cycle() {
    assert_signal_stops_session(libc::SIGTERM, &["--heartbeat-interval", "0.3"]);
}

#[cfg(unix)]
#[test]
fn test_ctrl_c_wakes_idle_session() {
    assert_signal_stops_session(libc::SIGINT, &["--no-heartbeat"]);
}
