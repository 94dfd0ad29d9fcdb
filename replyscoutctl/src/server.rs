use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use replyscout_core::{
    PostView, SearchError, SearchOrchestrator, SearchRequest, SearchResponse, SqliteScoutStore,
    StoreError, Thresholds,
};

/// Shared state for the web server. Searches drive a single browser, so they
/// are serialised through the mutex.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Mutex<SearchOrchestrator>>,
    pub store: SqliteScoutStore,
    pub platform: String,
}

impl AppState {
    pub fn new(orchestrator: SearchOrchestrator, store: SqliteScoutStore) -> Self {
        let platform = orchestrator.settings().platform.clone();
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            store,
            platform,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search_posts))
        .route("/search/delete/:id", delete(delete_post))
        .route("/search/update/:id", put(update_reply))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = create_router(state);
    info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}

#[derive(Debug)]
pub enum ApiError {
    Search(SearchError),
    Store(StoreError),
    BadRequest(String),
    NotFound(String),
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        ApiError::Search(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Search(SearchError::InvalidRequest(message)) => {
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Search(SearchError::Browser(err)) => (StatusCode::BAD_GATEWAY, err.to_string()),
            ApiError::Search(SearchError::Store(err)) | ApiError::Store(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    #[serde(rename = "minLikes")]
    pub min_likes: Option<u64>,
    #[serde(rename = "minRetweets")]
    pub min_retweets: Option<u64>,
    #[serde(rename = "minFollowers")]
    pub min_followers: Option<u64>,
    pub max_results: Option<usize>,
}

impl SearchQuery {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            keywords: self.keyword.unwrap_or_default(),
            thresholds: Thresholds::new(
                self.min_likes.unwrap_or(0),
                self.min_retweets.unwrap_or(0),
                self.min_followers.unwrap_or(0),
            ),
            max_results: self.max_results,
            account_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateReplyBody {
    pub reply: String,
}

async fn search_posts(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(query) = query?;
    let request = query.into_request();
    let orchestrator = state.orchestrator.lock().await;
    let outcome = orchestrator.search(&request).await?;
    Ok(Json(SearchResponse::from(&outcome)))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.clone();
    let platform = state.platform.clone();
    let target = id.clone();
    let removed = tokio::task::spawn_blocking(move || store.delete_post(&platform, &target))
        .await
        .map_err(StoreError::from)??;
    if !removed {
        return Err(ApiError::NotFound(format!("post {id} not found")));
    }
    Ok(Json(json!({ "deleted": id })))
}

async fn update_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateReplyBody>, JsonRejection>,
) -> Result<Json<PostView>, ApiError> {
    let Json(body) = body?;
    let store = state.store.clone();
    let platform = state.platform.clone();
    let target = id.clone();
    let updated =
        tokio::task::spawn_blocking(move || store.update_reply(&platform, &target, &body.reply))
            .await
            .map_err(StoreError::from)??;
    match updated {
        Some(post) => Ok(Json(PostView::from(&post))),
        None => Err(ApiError::NotFound(format!("post {id} not found"))),
    }
}
