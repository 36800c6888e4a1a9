//! Spawns the `superfetch serve` binary against an ephemeral loopback port
//! and drives the Streamable HTTP gateway end to end.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

struct ServerHandle {
    child: Child,
    port: u16,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_server() -> ServerHandle {
    let port = pick_free_port();
    let bin = assert_cmd::cargo::cargo_bin!("superfetch");
    let child = Command::new(bin)
        .args(["serve"])
        .env("HOST", "127.0.0.1")
        .env("PORT", port.to_string())
        .env("LOG_LEVEL", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn superfetch serve");
    ServerHandle { child, port }
}

fn pick_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

async fn wait_for_health(base: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{base}/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("server did not become healthy in time");
}

#[tokio::test]
async fn initialize_then_tools_list_round_trips_a_session() {
    let server = spawn_server();
    let base = format!("http://127.0.0.1:{}", server.port);
    wait_for_health(&base).await;

    let client = reqwest::Client::new();
    let init = client
        .post(format!("{base}/mcp"))
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "params": {},
            "id": 1
        }))
        .send()
        .await
        .expect("initialize request");

    assert!(init.status().is_success());
    let session_id = init
        .headers()
        .get("mcp-session-id")
        .expect("mcp-session-id header present")
        .to_str()
        .unwrap()
        .to_string();

    let list = client
        .post(format!("{base}/mcp"))
        .header("mcp-session-id", &session_id)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/list",
            "id": 2
        }))
        .send()
        .await
        .expect("tools/list request");

    assert!(list.status().is_success());
    let body: serde_json::Value = list.json().await.expect("parse tools/list response");
    let tools = body["result"]["tools"].as_array().expect("tools array");
    assert!(tools.iter().any(|t| t["name"] == "fetch-url"));
}

#[tokio::test]
async fn missing_session_id_on_a_non_initialize_call_is_rejected() {
    let server = spawn_server();
    let base = format!("http://127.0.0.1:{}", server.port);
    wait_for_health(&base).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/mcp"))
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/list",
            "id": 1
        }))
        .send()
        .await
        .expect("tools/list without session");

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fetch_url_against_a_metadata_address_is_blocked() {
    let server = spawn_server();
    let base = format!("http://127.0.0.1:{}", server.port);
    wait_for_health(&base).await;

    let client = reqwest::Client::new();
    let init = client
        .post(format!("{base}/mcp"))
        .json(&serde_json::json!({ "jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1 }))
        .send()
        .await
        .unwrap();
    let session_id = init
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let resp = client
        .post(format!("{base}/mcp"))
        .header("mcp-session-id", &session_id)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "fetch-url",
                "arguments": { "url": "http://169.254.169.254/latest/meta-data/" }
            },
            "id": 2
        }))
        .send()
        .await
        .expect("tools/call request");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("parse tools/call response");
    assert_eq!(body["result"]["isError"].as_bool(), Some(true));
    let code = body["result"]["structuredContent"]["code"].as_str().unwrap_or("");
    assert!(
        code == "blocked_host" || code == "invalid_url" || code == "blocked_redirect",
        "unexpected error code: {code}"
    );
}
