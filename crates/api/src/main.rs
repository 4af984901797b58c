use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockpipe_core::collector::Collector;
use stockpipe_core::domain::news::NewsRecord;
use stockpipe_core::domain::stock::{Basket, StockRecord};
use stockpipe_core::pipeline::Pipeline;
use stockpipe_core::storage::stocks::PgStockStore;
use stockpipe_core::storage::StockStore;
use stockpipe_core::PipelineError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockpipe_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = match connect_store(&settings).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "database unavailable; refusing to start");
            return Err(e);
        }
    };

    let collector = Collector::from_env()?;
    let state = AppState {
        pipeline: Pipeline::new(collector, store.clone()),
        saved_stocks_limit: settings.saved_stocks_limit,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    Ok(())
}

async fn connect_store(
    settings: &stockpipe_core::config::Settings,
) -> anyhow::Result<PgStockStore> {
    let db_url = settings.require_database_url()?;
    let store = PgStockStore::connect(db_url, settings.db_max_connections).await?;
    store.migrate().await?;
    Ok(store)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/favicon.ico", get(favicon))
        .route("/stock", post(post_stock))
        .route("/stock/:symbol", get(get_stock))
        .route("/samsung-stocks", post(samsung_stocks).get(samsung_stocks))
        .route("/snp-stocks", post(snp_stocks).get(snp_stocks))
        .route("/saved-stocks-info", get(saved_stocks_info))
        .route("/news", get(news))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    saved_stocks_limit: usize,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Every pipeline failure is a 500; the detail goes to logs and Sentry only.
    fn internal(err: PipelineError, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(kind = err.kind(), error = %err, "{message}");
        sentry::capture_error(&err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct StockRequest {
    symbol: String,
}

#[derive(Debug, Serialize)]
struct SavedStock {
    message: &'static str,
    data: StockRecord,
}

#[derive(Debug, Serialize)]
struct Message {
    message: String,
}

#[derive(Debug, Serialize)]
struct Data<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SavedStocksQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NewsQuery {
    query: Option<String>,
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to Stock Data Pipeline!" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn post_stock(
    State(state): State<AppState>,
    body: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<SavedStock>, ApiError> {
    let Ok(Json(req)) = body else {
        return Err(ApiError::bad_request("Invalid request body"));
    };
    collect_stock(&state, &req.symbol).await
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<SavedStock>, ApiError> {
    collect_stock(&state, &symbol).await
}

async fn collect_stock(state: &AppState, symbol: &str) -> Result<Json<SavedStock>, ApiError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::bad_request("Invalid request body"));
    }

    let data = state
        .pipeline
        .collect_symbol(symbol)
        .await
        .map_err(|err| {
            let message = match &err {
                PipelineError::Persist { .. } => "Failed to save stock data",
                _ => "Failed to fetch stock data",
            };
            ApiError::internal(err, message)
        })?;

    Ok(Json(SavedStock {
        message: "Stock data saved successfully",
        data,
    }))
}

async fn samsung_stocks(State(state): State<AppState>) -> Result<Json<Message>, ApiError> {
    collect_basket(&state, Basket::Samsung).await
}

async fn snp_stocks(State(state): State<AppState>) -> Result<Json<Message>, ApiError> {
    collect_basket(&state, Basket::Snp).await
}

async fn collect_basket(state: &AppState, basket: Basket) -> Result<Json<Message>, ApiError> {
    state
        .pipeline
        .collect_basket(basket)
        .await
        .map_err(|err| {
            ApiError::internal(err, format!("Failed to get {} stock data", basket.label()))
        })?;

    Ok(Json(Message {
        message: format!("{} stock data saved to DB", basket.label()),
    }))
}

async fn saved_stocks_info(
    State(state): State<AppState>,
    query: Result<Query<SavedStocksQuery>, QueryRejection>,
) -> Result<Json<Data<Vec<StockRecord>>>, ApiError> {
    let Ok(Query(query)) = query else {
        return Err(ApiError::bad_request("Invalid limit"));
    };
    let limit = query
        .limit
        .unwrap_or(state.saved_stocks_limit)
        .min(state.saved_stocks_limit);

    let data = state
        .pipeline
        .recent(limit)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to fetch saved stock data"))?;

    Ok(Json(Data { data }))
}

async fn news(
    State(state): State<AppState>,
    query: Result<Query<NewsQuery>, QueryRejection>,
) -> Result<Json<Data<Vec<NewsRecord>>>, ApiError> {
    let query = query
        .ok()
        .and_then(|Query(q)| q.query)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("query is required"))?;

    let data = state
        .pipeline
        .news(&query)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to fetch news"))?;

    Ok(Json(Data { data }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockpipe_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
