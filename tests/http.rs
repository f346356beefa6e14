use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use mailsift::config::Config;
use mailsift::coordinator::Coordinator;
use mailsift::server::router;

fn eml(subject: &str, body: &str) -> String {
    format!(
        "From: alice@example.com\r\nTo: me@example.com\r\nSubject: {}\r\n\r\n{}\r\n",
        subject, body
    )
}

/// Serve the API for an `.eml` tree on an ephemeral port.
async fn start_server() -> (TempDir, String) {
    let tmp = TempDir::new().unwrap();
    let mail = tmp.path().join("mail");
    fs::create_dir_all(mail.join("archive")).unwrap();
    fs::write(
        mail.join("a.eml"),
        eml("Quarterly numbers", "The quarterly revenue grew by fifteen percent."),
    )
    .unwrap();
    fs::write(mail.join("b.eml"), eml("Lunch", "Pizza lunch on Friday.")).unwrap();
    fs::write(
        mail.join("archive/c.eml"),
        eml("Offsite", "The team offsite is in the mountains."),
    )
    .unwrap();

    let mut config = Config::minimal();
    config.mailbox.kind = "eml_dir".to_string();
    config.mailbox.root = Some(mail);
    config.embedding.provider = "hash".to_string();
    config.validate().unwrap();

    let coordinator = Arc::new(Coordinator::from_config(&config).await.unwrap());
    assert!(coordinator.initialize().await);
    let app = router(coordinator, 5, 10);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (tmp, format!("http://{}", addr))
}

#[tokio::test]
async fn test_health() {
    let (_tmp, base) = start_server().await;
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
async fn test_search_requires_query() {
    let (_tmp, base) = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_search_empty_index_returns_no_results() {
    let (_tmp, base) = start_server().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({"query": "revenue"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn test_sync_then_search() {
    let (_tmp, base) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/sync", base))
        .json(&json!({"batch_size": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["indexed"].as_array().unwrap().len(), 3);
    assert_eq!(body["status"]["status"], "idle");
    assert_eq!(body["status"]["synced_count"], 3);

    let body: Value = client
        .post(format!("{}/search", base))
        .json(&json!({"query": "quarterly revenue", "n_results": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["message_id"], "a.eml");
    assert_eq!(results[0]["chunk_index"], 0);
    assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());

    let state: Value = client
        .get(format!("{}/state", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["synced_count"], 3);
    assert_eq!(state["indexed_chunks"], 3);
    assert!(state["last_sync_time"].is_string());
}

#[tokio::test]
async fn test_fetch_message() {
    let (_tmp, base) = start_server().await;

    let body: Value = reqwest::get(format!("{}/messages/archive/c.eml", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["subject"], "Offsite");

    let resp = reqwest::get(format!("{}/messages/missing.eml", base))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
