//! REST API for knowdb.
//!
//! A stateless HTTP server with JSON endpoints over [`KnowledgeBase`]. Each request
//! names the knowledge-base directory in its `db` field; the server opens it per
//! request, and every write is persisted before the response is sent. Engine calls
//! run on the blocking pool and are serialized by one process-wide lock.
//!
//! ## Endpoints
//!
//! - `POST /add` - Add knowledge items
//! - `POST /get` - Retrieve items by hash
//! - `POST /update` - Replace items
//! - `POST /delete` - Delete items by hash
//! - `POST /search` - Top-k search for one or more queries
//! - `POST /ingest` - Chunk and add a whole document
//! - `POST /clear` - Clear both stores
//!
//! ## Usage
//!
//! ```rust,no_run
//! use knowdb::{HashingEmbedder, EmbeddingFallback, server::{self, AppState}};
//! use std::sync::Arc;
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = AppState::new(Arc::new(HashingEmbedder::new(384)), EmbeddingFallback::Reject);
//!     server::run("0.0.0.0:7878", state).await
//! }
//! ```

use crate::{
    chunker::DEFAULT_WINDOW_SIZE,
    embedding::Embedder,
    error::{KbError, Result},
    item::KnowledgeItem,
    knowledge::{EmbeddingFallback, KnowledgeBase},
};
use actix_web::{App, HttpResponse, HttpServer, Responder, http::StatusCode, web};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Shared by every worker: the embedding provider and the lock around engine calls.
pub struct AppState {
    embedder: Arc<dyn Embedder>,
    fallback: EmbeddingFallback,
    lock: Mutex<()>,
}

impl AppState {
    pub fn new(embedder: Arc<dyn Embedder>, fallback: EmbeddingFallback) -> Self {
        AppState {
            embedder,
            fallback,
            lock: Mutex::new(()),
        }
    }

    fn open(&self, db: &str) -> KnowledgeBase<Arc<dyn Embedder>> {
        KnowledgeBase::open(db, Arc::clone(&self.embedder)).with_fallback(self.fallback)
    }
}

// --- Request structs ---

#[derive(Deserialize)]
struct NewItem {
    text: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct UpdateItem {
    hash: String,
    text: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct Query {
    query: String,
    top_k: usize,
}

#[derive(Deserialize)]
struct AddRequest {
    db: String,
    items: Vec<NewItem>,
}

#[derive(Deserialize)]
struct HashesRequest {
    db: String,
    hashes: Vec<String>,
}

#[derive(Deserialize)]
struct UpdateRequest {
    db: String,
    items: Vec<UpdateItem>,
}

#[derive(Deserialize)]
struct SearchRequest {
    db: String,
    queries: Vec<Query>,
}

#[derive(Deserialize)]
struct IngestRequest {
    db: String,
    text: String,
    window_size: Option<usize>,
}

#[derive(Deserialize)]
struct ClearRequest {
    db: String,
}

// --- Response structs ---

#[derive(Serialize)]
struct AddResponse {
    added: usize,
    results: Vec<ItemResult>,
}

#[derive(Serialize)]
struct UpdateResponse {
    updated: usize,
    results: Vec<ItemResult>,
}

/// Outcome for one item of a batch. `hash` is the stored hash on success.
#[derive(Serialize)]
struct ItemResult {
    hash: Option<String>,
    status: String,
    message: String,
}

impl ItemResult {
    fn ok(hash: String, message: &str) -> Self {
        ItemResult { hash: Some(hash), status: "ok".to_string(), message: message.to_string() }
    }

    fn failed(hash: Option<String>, error: KbError) -> Self {
        ItemResult { hash, status: "error".to_string(), message: error.to_string() }
    }
}

#[derive(Serialize)]
struct GetResponse {
    results: Vec<GetResult>,
}

#[derive(Serialize)]
struct GetResult {
    hash: String,
    item: Option<KnowledgeItem>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: usize,
    results: Vec<DeleteResult>,
}

#[derive(Serialize)]
struct DeleteResult {
    hash: String,
    deleted: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultGroup>,
}

#[derive(Serialize)]
struct SearchResultGroup {
    matches: Vec<KnowledgeItem>,
    message: String,
}

#[derive(Serialize)]
struct IngestResponse {
    ingested: usize,
    items: Vec<KnowledgeItem>,
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: bool,
}

fn error_status(e: &KbError) -> StatusCode {
    match e {
        KbError::Storage { .. } | KbError::Codec { .. } | KbError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        KbError::Embedding(_) => StatusCode::BAD_GATEWAY,
        KbError::DimensionMismatch { .. } | KbError::EmptyText => StatusCode::BAD_REQUEST,
    }
}

/// Opens `db` under the global lock on the blocking pool and runs `op` against it.
async fn with_knowledge_base<R, F>(state: web::Data<AppState>, db: String, op: F) -> HttpResponse
where
    R: Serialize + Send + 'static,
    F: FnOnce(&mut KnowledgeBase<Arc<dyn Embedder>>) -> Result<R> + Send + 'static,
{
    let outcome = web::block(move || {
        // stores are replaced by rename, so a poisoned lock guards no half-written file
        let _guard = state.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut kb = state.open(&db);
        op(&mut kb)
    })
    .await;

    match outcome {
        Ok(Ok(body)) => HttpResponse::Ok().json(body),
        Ok(Err(e)) => {
            error!(error = %e, "request failed");
            HttpResponse::build(error_status(&e)).json(serde_json::json!({"error": e.to_string()}))
        }
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()})),
    }
}

// --- Handlers ---

async fn add_handler(state: web::Data<AppState>, body: web::Json<AddRequest>) -> impl Responder {
    let AddRequest { db, items } = body.into_inner();

    with_knowledge_base(state, db, move |kb| {
        let mut added = 0;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            match kb.add_item(&item.text, item.score) {
                Ok(stored) => {
                    added += 1;
                    results.push(ItemResult::ok(stored.hash, "added"));
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => results.push(ItemResult::failed(None, e)),
            }
        }

        Ok(AddResponse { added, results })
    })
    .await
}

async fn get_handler(state: web::Data<AppState>, body: web::Json<HashesRequest>) -> impl Responder {
    let HashesRequest { db, hashes } = body.into_inner();

    with_knowledge_base(state, db, move |kb| {
        let mut results = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let item = kb.get_item(&hash)?;
            results.push(GetResult { hash, item });
        }
        Ok(GetResponse { results })
    })
    .await
}

async fn update_handler(state: web::Data<AppState>, body: web::Json<UpdateRequest>) -> impl Responder {
    let UpdateRequest { db, items } = body.into_inner();

    with_knowledge_base(state, db, move |kb| {
        let mut updated = 0;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            match kb.update_item(&item.hash, &item.text, item.score) {
                Ok(stored) => {
                    updated += 1;
                    results.push(ItemResult::ok(stored.hash, "updated"));
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => results.push(ItemResult::failed(Some(item.hash), e)),
            }
        }

        Ok(UpdateResponse { updated, results })
    })
    .await
}

async fn delete_handler(state: web::Data<AppState>, body: web::Json<HashesRequest>) -> impl Responder {
    let HashesRequest { db, hashes } = body.into_inner();

    with_knowledge_base(state, db, move |kb| {
        let mut deleted = 0;
        let mut results = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let removed = kb.delete_item(&hash)?;
            if removed {
                deleted += 1;
            }
            results.push(DeleteResult { hash, deleted: removed });
        }
        Ok(DeleteResponse { deleted, results })
    })
    .await
}

async fn search_handler(state: web::Data<AppState>, body: web::Json<SearchRequest>) -> impl Responder {
    let SearchRequest { db, queries } = body.into_inner();

    with_knowledge_base(state, db, move |kb| {
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            match kb.search(&query.query, query.top_k) {
                Ok(matches) => results.push(SearchResultGroup {
                    matches,
                    message: "Search Success".to_string(),
                }),
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => results.push(SearchResultGroup {
                    matches: Vec::new(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(SearchResponse { results })
    })
    .await
}

async fn ingest_handler(state: web::Data<AppState>, body: web::Json<IngestRequest>) -> impl Responder {
    let IngestRequest { db, text, window_size } = body.into_inner();
    let window_size = window_size.unwrap_or(DEFAULT_WINDOW_SIZE);

    with_knowledge_base(state, db, move |kb| {
        let items = kb.ingest_document(&text, window_size)?;
        Ok(IngestResponse { ingested: items.len(), items })
    })
    .await
}

async fn clear_handler(state: web::Data<AppState>, body: web::Json<ClearRequest>) -> impl Responder {
    let ClearRequest { db } = body.into_inner();

    with_knowledge_base(state, db, |kb| {
        kb.clear()?;
        Ok(ClearResponse { cleared: true })
    })
    .await
}

/// Registers every endpoint. The app must carry a `web::Data<AppState>`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/add").route(web::post().to(add_handler)))
       .service(web::resource("/get").route(web::post().to(get_handler)))
       .service(web::resource("/update").route(web::post().to(update_handler)))
       .service(web::resource("/delete").route(web::post().to(delete_handler)))
       .service(web::resource("/search").route(web::post().to(search_handler)))
       .service(web::resource("/ingest").route(web::post().to(ingest_handler)))
       .service(web::resource("/clear").route(web::post().to(clear_handler)));
}

/// Serves the API on `bind` until the process is stopped.
pub async fn run(bind: &str, state: AppState) -> std::io::Result<()> {
    let data = web::Data::new(state);
    info!(bind, embedder = data.embedder.name(), "starting knowdb server");

    HttpServer::new(move || App::new().app_data(data.clone()).configure(config))
        .bind(bind)?
        .run()
        .await
}
