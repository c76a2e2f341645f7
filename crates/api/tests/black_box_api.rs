use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use rolegate_api::app::{AppServices, build_app_with};
use rolegate_core::SystemClock;
use rolegate_infra::AppConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory services, ephemeral port.
        let services = AppServices::in_memory(&AppConfig::default(), Arc::new(SystemClock));
        let app = build_app_with(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn get_json(client: &reqwest::Client, url: String, identity: &str) -> (StatusCode, Value) {
    let res = client.get(url).header("x-identity", identity).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn switch(client: &reqwest::Client, srv: &TestServer, identity: &str, role: &str) -> (StatusCode, Value) {
    let res = client
        .post(srv.url("/roles/switch"))
        .header("x-identity", identity)
        .json(&json!({ "role": role }))
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn health_needs_no_identity() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn identity_required_for_role_endpoints() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new().get(srv.url("/roles")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test(flavor = "multi_thread")]
async fn new_identity_resolves_to_viewer() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availableRoles"], json!(["viewer"]));
    assert_eq!(body["currentRole"], "viewer");
    assert_eq!(body["testMode"], false);
    assert_eq!(body["degraded"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn switching_to_an_ungranted_role_is_forbidden() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = switch(&client, &srv, "npub_abc", "admin").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["errorCode"], "RoleNotGranted");
    assert_eq!(body["availableRoles"], json!(["viewer"]));

    let (_, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(body["currentRole"], "viewer");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_role_is_a_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = switch(&client, &srv, "npub_abc", "pirate").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "InvalidRole");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mode_header_unlocks_every_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/roles"))
        .header("x-identity", "npub_abc")
        .header("x-test-mode", "true")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["testMode"], true);
    assert_eq!(
        body["availableRoles"],
        json!(["viewer", "advertiser", "publisher", "admin", "stakeholder"])
    );
    assert_eq!(body["currentRole"], "admin");

    // Session persists without the header until ended.
    let (_, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(body["testMode"], true);

    let res = client
        .delete(srv.url("/roles/test-mode"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (_, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(body["testMode"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_grant_then_switch() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Reserved test prefix: holds admin via test mode.
    let res = client
        .post(srv.url("/admin/roles/npub_abc/advertiser"))
        .header("x-identity", "npub_test_ops")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let grant: Value = res.json().await.unwrap();
    assert_eq!(grant["role"], "advertiser");
    assert_eq!(grant["isActive"], true);

    let (status, body) = switch(&client, &srv, "npub_abc", "advertiser").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["role"], "advertiser");

    let (_, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(body["availableRoles"], json!(["viewer", "advertiser"]));
    assert_eq!(body["currentRole"], "advertiser");

    // Revoke: pointer falls back to viewer.
    let res = client
        .delete(srv.url("/admin/roles/npub_abc/advertiser"))
        .header("x-identity", "npub_test_ops")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, body) = get_json(&client, srv.url("/roles"), "npub_abc").await;
    assert_eq!(body["currentRole"], "viewer");
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_inspect_reads_the_store_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, srv.url("/admin/roles/npub_abc"), "npub_test_ops").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availableRoles"], json!(["viewer"]));
    assert_eq!(body["testMode"], false);

    let (_, body) = get_json(&client, srv.url("/admin/roles/npub_test_target"), "npub_test_ops").await;
    assert_eq!(body["testMode"], true);
    assert_eq!(body["currentRole"], "admin");
}

#[tokio::test(flavor = "multi_thread")]
async fn referrer_alone_does_not_unlock_admin() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/roles"))
        .header("x-identity", "npub_abc")
        .header("referer", "https://evil.example/?testMode=true")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["testMode"], false);
    assert_eq!(body["availableRoles"], json!(["viewer"]));

    let res = client
        .get(srv.url("/admin/roles/npub_other"))
        .header("x-identity", "npub_abc")
        .header("referer", "https://evil.example/?testMode=true")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_admin_cannot_grant() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/admin/roles/npub_other/admin"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "role_not_granted");
}

#[tokio::test(flavor = "multi_thread")]
async fn onboarding_flow_drives_redirect() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (_, body) = get_json(&client, srv.url("/auth/redirect?role=publisher"), "npub_abc").await;
    assert!(body["location"].as_str().unwrap().starts_with("/onboarding?role=publisher&t="));

    let res = client
        .put(srv.url("/onboarding/publisher/step"))
        .header("x-identity", "npub_abc")
        .json(&json!({ "step": "site-details" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["recorded"], true);

    let (_, body) = get_json(&client, srv.url("/onboarding/publisher"), "npub_abc").await;
    assert_eq!(body["state"]["status"], "in_progress");
    assert_eq!(body["state"]["step"], "site-details");

    let res = client
        .post(srv.url("/onboarding/publisher/complete"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, body) = get_json(&client, srv.url("/auth/redirect?role=publisher"), "npub_abc").await;
    assert_eq!(body["location"], "/dashboard/publisher");

    let res = client
        .delete(srv.url("/onboarding/publisher"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["removed"], 1);

    let (_, body) = get_json(&client, srv.url("/auth/redirect?role=publisher"), "npub_abc").await;
    assert!(body["location"].as_str().unwrap().starts_with("/onboarding?role=publisher"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_login_role_redirects_to_generic_dashboard() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (_, body) = get_json(&client, srv.url("/auth/redirect?role=pirate"), "npub_abc").await;
    assert_eq!(body["location"], "/dashboard");
}

#[tokio::test(flavor = "multi_thread")]
async fn login_resolves_roles_and_routes_to_onboarding() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"]["currentRole"], "viewer");
    assert_eq!(body["pending"], false);
    assert!(body["location"].as_str().unwrap().starts_with("/onboarding?role=viewer&t="));

    let res = client
        .post(srv.url("/auth/logout"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test(flavor = "multi_thread")]
async fn role_changes_stream_to_sibling_sessions() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Seed a grant so the switch succeeds.
    let res = client
        .post(srv.url("/admin/roles/npub_abc/publisher"))
        .header("x-identity", "npub_test_ops")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let mut stream = client
        .get(srv.url("/roles/changes"))
        .header("x-identity", "npub_abc")
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let (status, _) = switch(&client, &srv, "npub_abc", "publisher").await;
    assert_eq!(status, StatusCode::OK);

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = String::new();
        while let Some(chunk) = stream.chunk().await.unwrap() {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            if buf.contains("\"role\":\"publisher\"") {
                break;
            }
        }
        buf
    })
    .await
    .expect("role change was not streamed in time");

    assert!(received.contains("event: auth.role.changed"));
    assert!(received.contains("\"role\":\"publisher\""));
}
