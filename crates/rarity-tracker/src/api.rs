//! HTTP/JSON API over a shared [`Coordinator`].
//!
//! | Method/Path | Body | Success |
//! |---|---|---|
//! | `POST /register` | `{port}` | `201 {message}` |
//! | `GET /peers` | `{port}` | `200 {available_peers}` |
//! | `POST /initialize_chunks` | `{file_id, file_size, chunk_data, port}` | `200 {message, torrent_info}` |
//! | `POST /update_chunk` | `{file_id, port, chunk_id}` | `200 {message, chunk_data}` |
//! | `GET /request_chunk` | `{file_id, port}` | `200 {chunk_id, node}` |
//! | `GET /torrent` | `{file_id}` | `200 TorrentInfo` |
//! | `GET /stats` | none | `200 {peer: counters}` |
//! | `POST /report_stats` | `{port, stats}` | `200 {message}` |
//!
//! Peer identities are built from the connection's source IP and the port in
//! the body. Every failure is answered with `400 {error, kind}`.

use crate::coordinator::{Coordinator, Registration};
use crate::error::CoordinatorError;
use crate::types::{
    ErrorResponse, InitializeChunksRequest, InitializeChunksResponse, MessageResponse,
    PeersResponse, PortRequest, ReportStatsRequest, RequestChunkRequest, RequestChunkResponse,
    TorrentRequest, UpdateChunkRequest, UpdateChunkResponse, peer_id,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

type Shared = State<Arc<Coordinator>>;

/// Error answered with `400 {error, kind}`
#[derive(Debug)]
pub enum ApiError {
    /// Coordinator rejected the operation
    Coordinator(CoordinatorError),
    /// Request body was missing a field or malformed
    BadRequest(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        ApiError::Coordinator(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::Coordinator(err) => ErrorResponse {
                error: err.to_string(),
                kind: Some(err.kind().to_string()),
            },
            ApiError::BadRequest(error) => ErrorResponse {
                error,
                kind: Some("bad_request".to_string()),
            },
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Build the API router
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/peers", get(peers))
        .route("/initialize_chunks", post(initialize_chunks))
        .route("/update_chunk", post(update_chunk))
        .route("/request_chunk", get(request_chunk))
        .route("/torrent", get(torrent))
        .route("/stats", get(stats))
        .route("/report_stats", post(report_stats))
        .with_state(coordinator)
}

/// Serve the API on `listener` until the process exits
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, coordinator: Arc<Coordinator>) -> std::io::Result<()> {
    serve_with_shutdown(listener, coordinator, std::future::pending()).await
}

/// Serve the API on `listener` until `shutdown` resolves
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Tracker listening on {}", addr);
    }

    axum::serve(
        listener,
        router(coordinator).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn require_port(body: Result<Json<PortRequest>, JsonRejection>) -> Result<u16, ApiError> {
    body.ok()
        .and_then(|Json(req)| req.port)
        .ok_or_else(|| ApiError::BadRequest("Missing port".to_string()))
}

async fn register(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<PortRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let port = require_port(body)?;
    let peer = peer_id(addr.ip(), port);

    let response = match coordinator.register_peer(peer).await {
        Registration::Registered => (
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Peer registered".to_string(),
            }),
        ),
        Registration::AlreadyRegistered => (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "Peer already exists".to_string(),
            }),
        ),
    };
    Ok(response.into_response())
}

async fn peers(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<PortRequest>, JsonRejection>,
) -> Result<Json<PeersResponse>, ApiError> {
    let port = require_port(body)?;
    let available_peers = coordinator.list_peers(&peer_id(addr.ip(), port)).await;
    Ok(Json(PeersResponse { available_peers }))
}

async fn initialize_chunks(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<InitializeChunksRequest>, JsonRejection>,
) -> Result<Json<InitializeChunksResponse>, ApiError> {
    let Json(req) = body?;
    let origin = peer_id(addr.ip(), req.port);

    let torrent_info = coordinator
        .initialize_chunks(&req.file_id, req.file_size, req.chunk_data, origin)
        .await?;

    Ok(Json(InitializeChunksResponse {
        message: "Chunk data initialized".to_string(),
        torrent_info,
    }))
}

async fn update_chunk(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<UpdateChunkRequest>, JsonRejection>,
) -> Result<Json<UpdateChunkResponse>, ApiError> {
    let Json(req) = body?;
    let peer = peer_id(addr.ip(), req.port);

    let chunk_data = coordinator
        .update_chunk(&req.file_id, &peer, req.chunk_id)
        .await?;

    Ok(Json(UpdateChunkResponse {
        message: "Chunk data updated".to_string(),
        chunk_data,
    }))
}

async fn request_chunk(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<RequestChunkRequest>, JsonRejection>,
) -> Result<Json<RequestChunkResponse>, ApiError> {
    let Json(req) = body?;
    let peer = peer_id(addr.ip(), req.port);

    let assignment = coordinator.request_chunk(&req.file_id, &peer).await?;
    Ok(Json(assignment.into()))
}

async fn torrent(
    State(coordinator): Shared,
    body: Result<Json<TorrentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let info = coordinator.torrent_info(&req.file_id).await?;
    Ok(Json(info).into_response())
}

async fn stats(State(coordinator): Shared) -> Response {
    Json(coordinator.statistics()).into_response()
}

async fn report_stats(
    State(coordinator): Shared,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<ReportStatsRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body?;
    coordinator.report_stats(&peer_id(addr.ip(), req.port), req.stats);

    Ok(Json(MessageResponse {
        message: "Stats recorded".to_string(),
    }))
}
