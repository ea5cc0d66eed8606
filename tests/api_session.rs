//! End-to-end exercises of the TCP command protocol: real listener,
//! real sessions, newline-delimited JSON over a socket.

use serde_json::Value;
use servctl::accounts::Accounts;
use servctl::api::{ApiServer, ServerContext};
use servctl::files::UserFiles;
use servctl::runner::ShellRunner;
use servctl::scripts::{ScriptArea, ScriptStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

struct TestServer {
    _tmp: TempDir,
    port: u16,
    _shutdown: watch::Sender<bool>,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let accounts = Arc::new(Accounts::open(&tmp.path().join("data")).unwrap());
    assert!(accounts.create_user("root", "root_password", true, 0));
    assert!(accounts.create_user("alice", "alice_password", false, 1));

    let scripts = ScriptStore::new(tmp.path().join("scripts"));
    scripts
        .upload(ScriptArea::Public, "greet.sh", "echo greetings\n")
        .unwrap();
    scripts
        .upload(ScriptArea::Private, "secret.sh", "echo secret\n")
        .unwrap();

    let ctx = Arc::new(ServerContext {
        accounts,
        runner: Arc::new(ShellRunner),
        scripts,
        files: UserFiles::new(tmp.path().join("users_data")),
    });

    let server = ApiServer::bind("127.0.0.1", 0, ctx).await.unwrap();
    let port = server.stats().port();
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.run(shutdown_rx));

    TestServer {
        _tmp: tmp,
        port,
        _shutdown: shutdown,
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(server: &TestServer) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", server.port))
            .await
            .unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn read_response(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a response")
            .unwrap();
        assert!(read > 0, "connection closed while expecting a response");
        serde_json::from_str(&line).expect("response should be one JSON object per line")
    }

    async fn send(&mut self, cmd: &str, args: &[&str]) -> Value {
        let envelope = serde_json::json!({ "cmd": cmd, "args": args });
        self.send_raw(&envelope.to_string()).await;
        self.read_response().await
    }

    /// True once the server has closed its side of the connection.
    async fn closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }
}

#[tokio::test]
async fn admin_login_console_cmd_exit_scenario() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    // Wrong password first.
    let res = client.send("login_attempt", &["root", "wrong"]).await;
    assert_eq!(res["status"], "fail");
    assert_eq!(res["message"], "Invalid username or password");

    // Correct credentials for an admin user.
    let res = client.send("login_attempt", &["root", "root_password"]).await;
    assert_eq!(res["status"], "success");
    assert_eq!(res["process_type"], "login_attempt");

    // Admin-gated shell execution returns captured output.
    let res = client.send("console_cmd", &["echo protocol_check"]).await;
    assert_eq!(res["status"], "success");
    let output: Value = serde_json::from_str(res["message"].as_str().unwrap()).unwrap();
    assert!(output["out"].as_str().unwrap().contains("protocol_check"));

    // Exit closes the connection after the response.
    let res = client.send("exit", &[]).await;
    assert_eq!(res["status"], "success");
    assert_eq!(res["process_type"], "exit");
    assert!(client.closed().await);
}

#[tokio::test]
async fn malformed_envelopes_are_skipped_without_a_response() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let res = client.send("login_attempt", &["alice", "alice_password"]).await;
    assert_eq!(res["status"], "success");

    // Garbage lines produce no response and do not reset the identity.
    client.send_raw("this is not json").await;
    client.send_raw("{\"cmd\": 42}").await;

    let res = client.send("list_scripts", &[]).await;
    assert_eq!(res["process_type"], "list_scripts");
    assert_eq!(res["status"], "success", "session identity must survive garbage input");
}

#[tokio::test]
async fn non_admin_sessions_see_only_public_surface() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    // Anonymous listing is refused.
    let res = client.send("list_scripts", &[]).await;
    assert_eq!(res["status"], "fail");
    assert_eq!(res["message"], "You need to be logged in");

    let res = client.send("login_attempt", &["alice", "alice_password"]).await;
    assert_eq!(res["status"], "success");

    // Only public scripts, no `private` field.
    let res = client.send("list_scripts", &[]).await;
    assert_eq!(res["status"], "success");
    let listing: Value = serde_json::from_str(res["message"].as_str().unwrap()).unwrap();
    assert_eq!(listing["scripts"][0], "greet.sh");
    assert!(listing.get("private").is_none());

    // Admin-only commands are refused without side effects.
    let res = client.send("console_cmd", &["id"]).await;
    assert_eq!(res["status"], "Unauthorized");
    let res = client.send("list_account_requests", &[]).await;
    assert_eq!(res["status"], "Unauthorized");
}

#[tokio::test]
async fn admin_sessions_list_private_scripts() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("login_attempt", &["root", "root_password"]).await;
    let res = client.send("list_scripts", &[]).await;
    let listing: Value = serde_json::from_str(res["message"].as_str().unwrap()).unwrap();
    assert_eq!(listing["private"][0], "secret.sh");
}

#[tokio::test]
async fn account_request_lifecycle_across_connections() {
    let server = start_server().await;

    // A visitor requests an account.
    let mut visitor = Client::connect(&server).await;
    let res = visitor.send("request_account", &["bob", "bob_password"]).await;
    assert_eq!(res["status"], "success");

    // The new credentials do not work yet.
    let res = visitor.send("login_attempt", &["bob", "bob_password"]).await;
    assert_eq!(res["status"], "fail");

    // An admin reviews and accepts the request.
    let mut admin = Client::connect(&server).await;
    admin.send("login_attempt", &["root", "root_password"]).await;
    let res = admin.send("list_account_requests", &[]).await;
    assert!(res["message"].as_str().unwrap().contains("bob"));

    let res = admin
        .send("accept_account_request", &["bob", "false", "2"])
        .await;
    assert_eq!(res["status"], "success");

    let res = admin.send("list_account_requests", &[]).await;
    assert!(!res["message"].as_str().unwrap().contains("bob"));

    // The originally requested password now authenticates.
    let res = visitor.send("login_attempt", &["bob", "bob_password"]).await;
    assert_eq!(res["status"], "success");
}

#[tokio::test]
async fn unknown_commands_fail_without_killing_the_session() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let res = client.send("self_destruct", &["now"]).await;
    assert_eq!(res["status"], "fail");
    assert_eq!(res["process_type"], "self_destruct");
    assert!(res["message"].as_str().unwrap().contains("Unknown command"));

    // The session is still serviceable.
    let res = client.send("login_attempt", &["alice", "alice_password"]).await;
    assert_eq!(res["status"], "success");
}

#[tokio::test]
async fn run_script_executes_from_the_public_area() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("login_attempt", &["alice", "alice_password"]).await;
    let res = client.send("run_script", &["greet.sh"]).await;
    assert_eq!(res["status"], "success");
    let output: Value = serde_json::from_str(res["message"].as_str().unwrap()).unwrap();
    assert!(output["results"].as_str().unwrap().contains("greetings"));
}

#[tokio::test]
async fn user_file_area_round_trip_over_the_wire() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    client.send("login_attempt", &["alice", "alice_password"]).await;

    let res = client.send("create_user_folder", &["notes"]).await;
    assert_eq!(res["status"], "success");
    let res = client
        .send("upload_user_file", &["notes/todo.txt", "ship it"])
        .await;
    assert_eq!(res["status"], "success");

    let res = client.send("list_user_folder", &["notes"]).await;
    assert_eq!(res["status"], "success");
    let entries: Value = serde_json::from_str(res["message"].as_str().unwrap()).unwrap();
    assert_eq!(entries[0]["name"], "todo.txt");
    assert_eq!(entries[0]["type"], "file");
}
