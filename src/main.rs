use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use pdf_chat_server::blob::BlobStore;
use pdf_chat_server::config::Settings;
use pdf_chat_server::database::{DbPool, Repository};
use pdf_chat_server::handlers;
use pdf_chat_server::services::providers::{BlobProvider, CatalogProvider, VectorProvider};
use pdf_chat_server::services::{
    ChatService, ContextBuilder, EmbeddingService, IngestionService, LlmService, RetrievalService,
    VectorService,
};
use pdf_chat_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,pdf_chat_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting PDF chat server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Initialize catalog
    let db_pool = DbPool::new(&settings.catalog).await?;
    sqlx::migrate!("./migrations").run(db_pool.get_pool()).await?;
    info!("Catalog connection established");

    // Process-wide adapter handles
    let catalog: Arc<dyn CatalogProvider> = Arc::new(Repository::new(db_pool));
    let blob: Arc<dyn BlobProvider> = Arc::new(BlobStore::new(settings.blob.clone()));
    let embedder = Arc::new(EmbeddingService::new(&settings.llm, &settings.embedding));
    let llm = Arc::new(LlmService::new(settings.llm.clone()));
    let vectors: Arc<dyn VectorProvider> = Arc::new(VectorService::new(
        &settings.vector,
        settings.embedding.dimension,
    ));

    // Core services
    let context_builder = ContextBuilder::new(blob.clone(), &settings.context);
    let chat = Arc::new(ChatService::new(
        catalog.clone(),
        llm.clone(),
        embedder.clone(),
        vectors.clone(),
        context_builder,
        settings.context.default_top_k,
    ));
    let ingestion = Arc::new(IngestionService::new(
        catalog.clone(),
        blob.clone(),
        embedder.clone(),
        vectors.clone(),
        settings.context.chunk_size,
        settings.context.chunk_overlap,
    ));
    let retrieval = Arc::new(RetrievalService::new(embedder.clone(), vectors.clone()));

    let state = Arc::new(AppState {
        catalog,
        blob,
        vectors,
        chat,
        ingestion,
        retrieval,
        presign_ttl_seconds: settings.blob.presign_ttl_seconds,
    });

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/presign", post(handlers::files::presign_handler))
        .route("/files", get(handlers::files::list_files_handler))
        .route("/files/{id}", get(handlers::files::get_file_handler))
        .route("/files/{id}", delete(handlers::files::delete_file_handler))
        .route("/webhook/ingest", post(handlers::webhook::ingest_handler))
        .route("/chat", post(handlers::chat::chat_handler))
        .route("/chats", get(handlers::chat::list_conversations_handler))
        .route("/chats/{id}", get(handlers::chat::get_conversation_handler))
        .route("/retrieve", post(handlers::retrieval::retrieve_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::new())
        // Request bodies are JSON only; uploads go straight to the blob
        // store through presigned URLs.
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}
