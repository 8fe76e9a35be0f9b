use actix_web::{App, HttpServer, dev::ServerHandle, web};
use knowdb::{EmbeddingFallback, HashingEmbedder, server::AppState};
use reqwest::Client;
use serde_json::{Value, json};
use std::{net::TcpListener, sync::Arc};
use tempfile::TempDir;
use tokio::time::{Duration, sleep};

/// Find a free port by binding to port 0
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server in the background; returns its handle and base URL
async fn start_server() -> (ServerHandle, String) {
    let port = free_port();
    let state = web::Data::new(AppState::new(
        Arc::new(HashingEmbedder::new(128)),
        EmbeddingFallback::Reject,
    ));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(knowdb::server::config)
    })
    .bind(format!("127.0.0.1:{}", port))
    .unwrap()
    .run();
    let handle = server.handle();
    tokio::spawn(server);
    sleep(Duration::from_millis(200)).await;

    (handle, format!("http://127.0.0.1:{}", port))
}

async fn post(client: &Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn kb_dir(temp_dir: &TempDir) -> String {
    temp_dir.path().join("kb").to_str().unwrap().to_string()
}

#[actix_web::test]
async fn test_add_and_search() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    // --- Add 3 items ---
    let (status, body) = post(&client, format!("{}/add", base), json!({
        "db": db,
        "items": [
            {"text": "Paris is the capital of France."},
            {"text": "The borrow checker enforces ownership rules.", "score": 0.5},
            {"text": "Tomatoes are botanically a fruit."}
        ]
    }))
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["added"], 3);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(body["results"][0]["hash"].as_str().unwrap().len(), 64);

    // --- Search: the capital question should find the Paris item ---
    let (status, body) = post(&client, format!("{}/search", base), json!({
        "db": db,
        "queries": [
            {"query": "capital of France", "top_k": 2},
            {"query": "anything", "top_k": 0}
        ]
    }))
    .await;

    assert_eq!(status, 200);
    let matches = body["results"][0]["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0]["text"], "Paris is the capital of France.");
    assert!(matches[0]["score"].as_f64().unwrap() >= matches[1]["score"].as_f64().unwrap());
    assert!(body["results"][1]["matches"].as_array().unwrap().is_empty());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_get_existing_and_missing() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    let (_, body) = post(&client, format!("{}/add", base), json!({
        "db": db,
        "items": [{"text": "  Ferris is a crab.  ", "score": 0.25}]
    }))
    .await;
    let hash = body["results"][0]["hash"].as_str().unwrap().to_string();

    let (status, body) = post(&client, format!("{}/get", base), json!({
        "db": db,
        "hashes": [hash, "no_such_hash"]
    }))
    .await;

    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();

    assert_eq!(results[0]["item"]["text"], "Ferris is a crab.");
    assert_eq!(results[0]["item"]["score"], 0.25);

    assert_eq!(results[1]["hash"], "no_such_hash");
    assert!(results[1]["item"].is_null());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_update_and_delete() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    let (_, body) = post(&client, format!("{}/add", base), json!({
        "db": db,
        "items": [{"text": "Rust 1.0 shipped in 2014."}, {"text": "Cargo builds crates."}]
    }))
    .await;
    let old_hash = body["results"][0]["hash"].as_str().unwrap().to_string();
    let other_hash = body["results"][1]["hash"].as_str().unwrap().to_string();

    // --- Update moves the item to the hash of its new text ---
    let (status, body) = post(&client, format!("{}/update", base), json!({
        "db": db,
        "items": [{"hash": old_hash, "text": "Rust 1.0 shipped in 2015."}]
    }))
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["updated"], 1);
    let new_hash = body["results"][0]["hash"].as_str().unwrap().to_string();
    assert_ne!(new_hash, old_hash);

    // --- Delete one existing, one missing ---
    let (status, body) = post(&client, format!("{}/delete", base), json!({
        "db": db,
        "hashes": [other_hash, "no_such_hash"]
    }))
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["results"][1]["deleted"], false);

    let (_, body) = post(&client, format!("{}/get", base), json!({
        "db": db,
        "hashes": [old_hash, new_hash, other_hash]
    }))
    .await;
    let results = body["results"].as_array().unwrap();
    assert!(results[0]["item"].is_null());
    assert_eq!(results[1]["item"]["text"], "Rust 1.0 shipped in 2015.");
    assert!(results[2]["item"].is_null());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_empty_item_reports_error_status() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    let (status, body) = post(&client, format!("{}/add", base), json!({
        "db": db,
        "items": [{"text": "   "}, {"text": "Valid knowledge."}]
    }))
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["added"], 1);
    assert_eq!(body["results"][0]["status"], "error");
    assert!(body["results"][0]["hash"].is_null());
    assert_eq!(body["results"][1]["status"], "ok");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_ingest_then_clear() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    let (status, body) = post(&client, format!("{}/ingest", base), json!({
        "db": db,
        "text": "Sentence one. Sentence two is a bit longer. Sentence three.",
        "window_size": 30
    }))
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["ingested"], 3);
    assert_eq!(body["items"][0]["text"], "Sentence one.");
    assert_eq!(body["items"][2]["text"], "Sentence three.");

    let (status, body) = post(&client, format!("{}/clear", base), json!({ "db": db })).await;
    assert_eq!(status, 200);
    assert_eq!(body["cleared"], true);

    let (_, body) = post(&client, format!("{}/search", base), json!({
        "db": db,
        "queries": [{"query": "sentence", "top_k": 5}]
    }))
    .await;
    assert!(body["results"][0]["matches"].as_array().unwrap().is_empty());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_search_empty_db() {
    let (handle, base) = start_server().await;
    let temp_dir = TempDir::new().unwrap();
    let db = kb_dir(&temp_dir);
    let client = Client::new();

    // Search a knowledge base that doesn't exist yet
    let (status, body) = post(&client, format!("{}/search", base), json!({
        "db": db,
        "queries": [{"query": "anything at all", "top_k": 5}]
    }))
    .await;

    assert_eq!(status, 200);
    assert!(body["results"][0]["matches"].as_array().unwrap().is_empty());
    // reads never create the store files
    assert!(!temp_dir.path().join("kb").exists());

    handle.stop(true).await;
}
