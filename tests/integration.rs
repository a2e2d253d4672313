//! Integration tests for the UserIP Server HTTP API.
//!
//! Each test starts a server on an ephemeral port backed by a snapshot file
//! in a temporary directory, and uses reqwest to exercise the endpoints.
//! Client IPs are supplied through `X-Forwarded-For`.

use std::net::SocketAddr;

use reqwest::Client;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use userip_server::{AppState, ServiceConfig, ServiceState};

const USER_HEADER: &str = "x-token-user-email";

struct TestServer {
    base: String,
    state: ServiceState,
    _dir: TempDir,
}

impl TestServer {
    fn snapshot_path(&self) -> std::path::PathBuf {
        self.state.store().persist_path().to_path_buf()
    }
}

/// Boots a server whose snapshot lives in `dir`. Loads any existing
/// snapshot first, the same way `main.rs` does.
async fn spawn_server_in(dir: TempDir, max_ips_per_user: u64) -> TestServer {
    let config = ServiceConfig::new(
        dir.path().join("user_ips.json").to_string_lossy().into_owned(),
        max_ips_per_user,
    );
    let state = ServiceState::new(&config).unwrap();
    state.load_from_disk().unwrap();

    let app = userip_server::router(AppState::with_default_header(state.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        state,
        _dir: dir,
    }
}

async fn spawn_server(max_ips_per_user: u64) -> TestServer {
    spawn_server_in(tempfile::tempdir().unwrap(), max_ips_per_user).await
}

/// Sends a tracked request for `user` from `ip`.
async fn visit(client: &Client, base: &str, user: &str, ip: &str) {
    let resp = client
        .get(format!("{base}/health"))
        .header(USER_HEADER, user)
        .header("x-forwarded-for", ip)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

async fn matches(client: &Client, base: &str, ip: &str) -> bool {
    let body: Value = client
        .get(format!("{base}/match"))
        .header("x-forwarded-for", ip)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["matched"].as_bool().unwrap()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_returns_ok() {
    let server = spawn_server(3).await;
    let client = Client::new();

    let resp = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["users_tracked"], 0);
    assert_eq!(body["dirty"], false);
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_id_generated_when_absent() {
    let server = spawn_server(3).await;

    let resp = Client::new()
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();

    let request_id = resp
        .headers()
        .get("x-request-id")
        .expect("missing x-request-id");
    // UUID format: 8-4-4-4-12
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Tracking and matching
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oldest_ip_is_evicted_and_unmatched() {
    let server = spawn_server(2).await;
    let client = Client::new();
    let user = "alice@example.com";

    visit(&client, &server.base, user, "10.0.0.1").await;
    visit(&client, &server.base, user, "10.0.0.2").await;
    assert!(matches(&client, &server.base, "10.0.0.1").await);

    visit(&client, &server.base, user, "10.0.0.3").await;
    assert!(!matches(&client, &server.base, "10.0.0.1").await);
    assert!(matches(&client, &server.base, "10.0.0.2").await);
    assert!(matches(&client, &server.base, "10.0.0.3").await);

    let body: Value = client
        .get(format!("{}/users/{user}/ips", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ips: Vec<&str> = body["ips"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["ip"].as_str().unwrap())
        .collect();
    assert_eq!(ips, ["10.0.0.3", "10.0.0.2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_ip_survives_eviction_by_one_user() {
    let server = spawn_server(1).await;
    let client = Client::new();

    visit(&client, &server.base, "alice@example.com", "172.16.0.1").await;
    visit(&client, &server.base, "bob@example.com", "172.16.0.1").await;

    let body: Value = client
        .get(format!("{}/ips/172.16.0.1/users", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["users"], json!(["alice@example.com", "bob@example.com"]));

    // Alice moves on; Bob still holds the IP.
    visit(&client, &server.base, "alice@example.com", "172.16.0.2").await;
    assert!(matches(&client, &server.base, "172.16.0.1").await);

    let body: Value = client
        .get(format!("{}/ips/172.16.0.1/users", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["users"], json!(["bob@example.com"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_user_is_not_found() {
    let server = spawn_server(3).await;

    let resp = Client::new()
        .get(format!("{}/users/nobody@example.com/ips", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn admin_flush_writes_current_schema() {
    let server = spawn_server(3).await;
    let client = Client::new();

    visit(&client, &server.base, "alice@example.com", "198.51.100.7").await;

    let resp = client
        .post(format!("{}/admin/flush", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["written"], true);

    let file: Value = serde_json::from_slice(&std::fs::read(server.snapshot_path()).unwrap()).unwrap();
    let ips = file["user_data"]["alice@example.com"]["ips"]
        .as_array()
        .unwrap();
    assert_eq!(ips.len(), 1);
    assert_eq!(ips[0]["ip"], "198.51.100.7");
    assert!(ips[0]["last_seen"].as_i64().unwrap() > 0);
    assert!(!server.snapshot_path().with_extension("json.tmp").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn state_survives_restart() {
    let server = spawn_server(3).await;
    let client = Client::new();

    visit(&client, &server.base, "carol@example.com", "203.0.113.20").await;
    visit(&client, &server.base, "carol@example.com", "203.0.113.21").await;
    server.state.shutdown().await.unwrap();

    let TestServer { _dir: dir, .. } = server;
    let restarted = spawn_server_in(dir, 3).await;

    assert!(matches(&client, &restarted.base, "203.0.113.20").await);
    assert_eq!(
        restarted.state.store().ips_for_user("carol@example.com"),
        ["203.0.113.21", "203.0.113.20"]
    );
    assert!(!restarted.state.store().is_dirty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn legacy_snapshot_is_loaded_and_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = json!({
        "user_data": {
            "dave@example.com": { "ips": ["192.0.2.1", "192.0.2.2"], "last_seen": 1_600_000_000 }
        }
    });
    std::fs::write(
        dir.path().join("user_ips.json"),
        serde_json::to_vec(&legacy).unwrap(),
    )
    .unwrap();

    let server = spawn_server_in(dir, 3).await;
    let client = Client::new();

    assert!(matches(&client, &server.base, "192.0.2.2").await);
    assert!(server.state.store().is_dirty());

    client
        .post(format!("{}/admin/flush", server.base))
        .send()
        .await
        .unwrap();

    let file: Value = serde_json::from_slice(&std::fs::read(server.snapshot_path()).unwrap()).unwrap();
    assert_eq!(
        file["user_data"]["dave@example.com"]["ips"],
        json!([
            { "ip": "192.0.2.1", "last_seen": 1_600_000_000 },
            { "ip": "192.0.2.2", "last_seen": 1_600_000_000 }
        ])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_snapshot_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_ips.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let config = ServiceConfig::new(path.to_string_lossy().into_owned(), 3);
    let state = ServiceState::new(&config).unwrap();
    assert!(state.load_from_disk().is_err());
}
