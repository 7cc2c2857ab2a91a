//! Integration tests for the `gravity-copy` binary entry point.

use std::fs;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use futures::{SinkExt, StreamExt};
use predicates::str::contains;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[test]
fn run_copies_the_input() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("in.csv");
    let output = dir.path().join("out.csv");
    fs::write(&input, "x,y\n3,4\n").expect("write input");

    let mut command = cargo_bin_cmd!("gravity-copy");
    command.arg("run").arg(&input).arg(&output);
    command.assert().success();

    assert_eq!(fs::read_to_string(&output).expect("read output"), "x,y\n3,4\n");
}

#[test]
fn malformed_json_input_exits_with_two() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("in.json");
    fs::write(&input, "{\"rows\": [").expect("write input");

    let mut command = cargo_bin_cmd!("gravity-copy");
    command.arg("run").arg(&input).arg(dir.path().join("out.json"));
    command
        .assert()
        .code(2)
        .stderr(contains("JSON input is not in a valid format."));
}

#[test]
fn missing_output_argument_exits_with_two() {
    let mut command = cargo_bin_cmd!("gravity-copy");
    command.args(["run", "in.csv"]);
    command.assert().code(2);
}

#[test]
fn help_exits_cleanly() {
    let mut command = cargo_bin_cmd!("gravity-copy");
    command.arg("--help");
    command.assert().success().stdout(contains("serve"));
}

struct ServerProcess(Child);

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[tokio::test]
async fn managed_server_announces_its_port_and_answers_requests() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("in.csv");
    let output = dir.path().join("out.csv");
    fs::write(&input, "a\n").expect("write input");

    let port = free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_gravity-copy"))
        .args(["serve", "--managed", "--port", &port.to_string()])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn server");
    let mut server = ServerProcess(child);

    let stdout = server.0.stdout.take().expect("piped stdout");
    let mut chirps = BufReader::new(stdout);
    let mut first = String::new();
    chirps.read_line(&mut first).expect("read chirp");
    assert_eq!(
        first.trim_end(),
        format!(r#"{{"status":"listening","port":{port}}}"#)
    );

    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .expect("websocket handshake");
    let request = serde_json::json!({
        "requestId": "e2e",
        "inputFile": input,
        "outputFile": output,
    });
    socket
        .send(Message::Text(request.to_string().into()))
        .await
        .expect("send request");

    let mut responses = Vec::new();
    while responses.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("server responded in time")
            .expect("connection open")
            .expect("read frame");
        if let Message::Text(text) = frame {
            responses.push(text.as_str().to_owned());
        }
    }
    assert_eq!(
        responses,
        [
            r#"{"status":"pending","requestId":"e2e"}"#,
            r#"{"status":"complete","requestId":"e2e"}"#,
        ]
    );
    assert_eq!(fs::read_to_string(&output).expect("read output"), "a\n");
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}
