//! End-to-end HTTP tests: start the server in-process on a free port and
//! drive it with reqwest multipart requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use paper_intake::config::Config;
use paper_intake::server::{run_server, run_server_with_service};
use paper_intake::service::IntakeService;
use paper_intake_core::models::{DocumentPatch, DocumentRecord, NewDocument, UploadStatus};
use paper_intake_core::store::memory::InMemoryStore;
use paper_intake_core::store::{DocumentStore, StoreError, StoreResult};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(tmp: &TempDir, port: u16, extra: &str) -> Config {
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"
max_upload_bytes = 1024
{}
"#,
        tmp.path().join("intake.sqlite").display(),
        port,
        extra
    );
    toml::from_str::<Config>(&config_content)
        .unwrap()
        .finalize()
        .unwrap()
}

fn port_of(cfg: &Config) -> u16 {
    cfg.server
        .bind
        .rsplit(':')
        .next()
        .unwrap()
        .parse::<u16>()
        .unwrap()
}

/// Spawns the server and returns its base URL.
async fn start(cfg: Config) -> String {
    let port = port_of(&cfg);
    tokio::spawn(async move {
        run_server(&cfg).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

/// Spawns the server over a caller-supplied store.
async fn start_with_store(cfg: Config, store: Arc<dyn DocumentStore>) -> String {
    let port = port_of(&cfg);
    let service = IntakeService::new(store, &cfg);
    tokio::spawn(async move {
        run_server_with_service(&cfg, service).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

/// In-memory store whose writes can be switched off mid-test.
#[derive(Default)]
struct BrokenStore {
    inner: InMemoryStore,
    fail_delete: AtomicBool,
    fail_insert: AtomicBool,
}

fn unreachable_store() -> StoreError {
    StoreError::backend(anyhow::anyhow!("connection reset"))
}

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn list_completed(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        self.inner.list_completed(project_id).await
    }
    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        self.inner.list_project(project_id).await
    }
    async fn get(&self, id: &str) -> StoreResult<Option<DocumentRecord>> {
        self.inner.get(id).await
    }
    async fn insert(&self, record: &DocumentRecord) -> StoreResult<DocumentRecord> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unreachable_store());
        }
        self.inner.insert(record).await
    }
    async fn delete(&self, id: &str) -> StoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unreachable_store());
        }
        self.inner.delete(id).await
    }
    async fn update(&self, id: &str, patch: &DocumentPatch) -> StoreResult<DocumentRecord> {
        self.inner.update(id, patch).await
    }
}

async fn seeded_broken_store() -> (Arc<BrokenStore>, String) {
    let store = Arc::new(BrokenStore::default());
    let original = NewDocument {
        project_id: "P".to_string(),
        user_id: "u1".to_string(),
        file_name: "paper.pdf".to_string(),
        file_size: 3,
        mime_type: "text/plain".to_string(),
        content: "ABC".to_string(),
    }
    .into_record(UploadStatus::Completed);
    store.inner.insert(&original).await.unwrap();
    (store, original.id)
}

fn form(project: &str, file_name: &str, text: &str) -> Form {
    Form::new().text("projectId", project.to_string()).part(
        "file",
        Part::bytes(text.as_bytes().to_vec())
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .unwrap(),
    )
}

async fn post(client: &reqwest::Client, url: &str, form: Form) -> (u16, Value) {
    let resp = client.post(url).multipart(form).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = start(test_config(&tmp, find_free_port(), "")).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_check_commit_and_block() {
    let tmp = TempDir::new().unwrap();
    let base = start(test_config(&tmp, find_free_port(), "")).await;
    let client = reqwest::Client::new();

    let (status, verdict) = post(
        &client,
        &format!("{}/documents/check", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(verdict["isDuplicate"], false);
    assert_eq!(verdict["recommendation"], "allow");

    let (status, body) = post(
        &client,
        &format!("{}/documents", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 201, "body={}", body);
    let id = body["document"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["document"]["status"], "completed");
    assert_eq!(body["document"]["userId"], "anonymous");

    let (status, verdict) = post(
        &client,
        &format!("{}/documents/check", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(verdict["isDuplicate"], true);
    assert_eq!(verdict["confidence"], 100.0);
    assert_eq!(verdict["classification"], "duplicate");
    assert_eq!(verdict["recommendation"], "block-upload");
    assert_eq!(verdict["matches"][0]["documentId"], id.as_str());

    let (status, body) = post(
        &client,
        &format!("{}/documents", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");
    assert_eq!(body["verdict"]["recommendation"], "block-upload");
}

#[tokio::test]
async fn test_validation_errors() {
    let tmp = TempDir::new().unwrap();
    let base = start(test_config(&tmp, find_free_port(), "")).await;
    let client = reqwest::Client::new();

    let no_project = Form::new().part(
        "file",
        Part::bytes(b"ABC".to_vec()).file_name("paper.pdf"),
    );
    let (status, body) = post(&client, &format!("{}/documents/check", base), no_project).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let no_file = Form::new().text("projectId", "P");
    let (status, _) = post(&client, &format!("{}/documents/check", base), no_file).await;
    assert_eq!(status, 400);

    let too_big = form("P", "big.txt", &"x".repeat(2048));
    let (status, body) = post(&client, &format!("{}/documents", base), too_big).await;
    assert_eq!(status, 413);
    assert_eq!(body["error"]["code"], "payload_too_large");

    let resp = client
        .get(format!("{}/documents/no-such-id", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_replace_and_list() {
    let tmp = TempDir::new().unwrap();
    let base = start(test_config(&tmp, find_free_port(), "")).await;
    let client = reqwest::Client::new();

    let (_, body) = post(
        &client,
        &format!("{}/documents", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    let old_id = body["document"]["id"].as_str().unwrap().to_string();

    let replace_form = form("P", "paper.pdf", "ABCD").text("existingDocumentId", old_id.clone());
    let (status, body) = post(&client, &format!("{}/documents/replace", base), replace_form).await;
    assert_eq!(status, 200, "body={}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "replaced");
    let new_id = body["newDocumentId"].as_str().unwrap().to_string();
    assert_ne!(new_id, old_id);

    let resp = client
        .get(format!("{}/documents/{}", base, old_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let doc: Value = client
        .get(format!("{}/documents/{}", base, new_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["content"], "ABCD");

    let list: Value = client
        .get(format!("{}/projects/P/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let docs = list["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], new_id.as_str());
    assert!(docs[0].get("content").is_none());
}

#[tokio::test]
async fn test_replace_requires_existing_id() {
    let tmp = TempDir::new().unwrap();
    let base = start(test_config(&tmp, find_free_port(), "")).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        &format!("{}/documents/replace", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("existingDocumentId"));
}

#[tokio::test]
async fn test_bearer_token_required() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp, find_free_port(), "");
    cfg.server.api_token = Some("s3cret".to_string());
    let base = start(cfg).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        &format!("{}/documents/check", base),
        form("P", "paper.pdf", "ABC"),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");

    let resp = client
        .post(format!("{}/documents/check", base))
        .bearer_auth("s3cret")
        .multipart(form("P", "paper.pdf", "ABC"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_replace_failed_maps_to_503() {
    let tmp = TempDir::new().unwrap();
    let (store, old_id) = seeded_broken_store().await;
    store.fail_delete.store(true, Ordering::SeqCst);
    let base = start_with_store(test_config(&tmp, find_free_port(), ""), store.clone()).await;
    let client = reqwest::Client::new();

    let replace_form = form("P", "paper.pdf", "ABCD").text("existingDocumentId", old_id.clone());
    let (status, body) = post(&client, &format!("{}/documents/replace", base), replace_form).await;

    assert_eq!(status, 503, "body={}", body);
    assert_eq!(body["success"], false);
    assert_eq!(body["outcome"], "replace-failed");
    assert_eq!(body["projectId"], "P");
    assert_eq!(body["oldDocumentId"], old_id.as_str());
    assert!(body["error"].as_str().unwrap().contains("connection reset"));
    assert!(store.inner.get(&old_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_replace_partial_maps_to_500() {
    let tmp = TempDir::new().unwrap();
    let (store, old_id) = seeded_broken_store().await;
    store.fail_insert.store(true, Ordering::SeqCst);
    let base = start_with_store(test_config(&tmp, find_free_port(), ""), store.clone()).await;
    let client = reqwest::Client::new();

    let replace_form = form("P", "paper.pdf", "ABCD").text("existingDocumentId", old_id.clone());
    let (status, body) = post(&client, &format!("{}/documents/replace", base), replace_form).await;

    assert_eq!(status, 500, "body={}", body);
    assert_eq!(body["success"], false);
    assert_eq!(body["outcome"], "replace-partial");
    assert_eq!(body["projectId"], "P");
    assert_eq!(body["oldDocumentId"], old_id.as_str());
    assert!(body.get("newDocumentId").is_none());
    assert!(store.inner.is_empty());
}
