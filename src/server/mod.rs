use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
};

use crate::cascade::TextToQuery;
use crate::config::ServerConfig;
use crate::executor::ClickHouseExecutor;
use crate::llm::{DisabledPlanRequestor, LlmConfig, LlmPlanRequestor, PlanRequestor};
use crate::schema_catalog::{build_relationships, CatalogError, SchemaRegistry};
use handlers::{health_check, query_handler, schema_search_handler};

pub mod handlers;
pub mod models;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TextToQuery>,
    pub config: ServerConfig,
}

/// Load the dictionary and wire the engine to the LLM and ClickHouse
/// collaborators configured in the environment.
pub fn build_engine(config: &ServerConfig) -> Result<TextToQuery, CatalogError> {
    let registry = SchemaRegistry::load(
        Path::new(&config.tables_csv),
        Path::new(&config.columns_csv),
    )?;
    let relationships = build_relationships(registry.tables());

    let requestor: Arc<dyn PlanRequestor> = match LlmConfig::from_env() {
        Some(llm) => {
            log::info!("LLM planner: {:?} model {} at {}", llm.provider, llm.model, llm.api_url);
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.llm_timeout_secs))
                .build()
                .unwrap_or_default();
            Arc::new(LlmPlanRequestor::with_client(client, llm))
        }
        None => {
            log::warn!("No LLM configured; answering with rule-based fallbacks only");
            Arc::new(DisabledPlanRequestor)
        }
    };

    Ok(TextToQuery::new(
        Arc::new(registry),
        Arc::new(relationships),
        requestor,
        Arc::new(ClickHouseExecutor::from_env()),
        config.cascade_settings(),
    ))
}

pub fn router(app_state: AppState) -> Router {
    let config = &app_state.config;
    // Outer bound only; the engine applies its own per-call timeouts.
    let request_timeout =
        Duration::from_secs(config.llm_timeout_secs * 2 + config.query_timeout_secs * 6);
    let body_limit = config.max_input_chars * 4 + 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(query_handler))
        .route("/schema/search", post(schema_search_handler))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(RequestBodyLimitLayer::new(body_limit))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(Arc::new(app_state))
}

pub async fn run_with_config(config: ServerConfig) {
    dotenv().ok();

    log::info!(
        "Server configuration: http={}:{}, dictionary={} / {}",
        config.http_host,
        config.http_port,
        config.tables_csv,
        config.columns_csv
    );

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("✗ Failed to load the schema dictionary: {}", e);
            log::error!("  Server cannot start without a dictionary.");
            std::process::exit(1);
        }
    };

    let http_bind_address = format!("{}:{}", config.http_host, config.http_port);
    let app = router(AppState {
        engine: Arc::new(engine),
        config: config.clone(),
    });

    let http_listener = match TcpListener::bind(&http_bind_address).await {
        Ok(listener) => {
            log::info!("Successfully bound HTTP listener to {}", http_bind_address);
            listener
        }
        Err(e) => {
            log::error!(
                "✗ FATAL: Failed to bind HTTP listener to {}: {}",
                http_bind_address,
                e
            );
            log::error!("  Is another process using port {}?", config.http_port);
            std::process::exit(1);
        }
    };

    println!("ClickAsk server is running");
    println!("  HTTP API: http://{}", http_bind_address);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        println!("Received shutdown signal, shutting down...");
    };

    if let Err(e) = axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        log::error!("HTTP server fatal error: {:?}", e);
        std::process::exit(1);
    }
}
