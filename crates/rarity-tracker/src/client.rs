//! HTTP client for the tracker API.

use crate::coordinator::Registration;
use crate::error::TrackerError;
use crate::types::{
    ChunkAssignment, ChunkMatrix, ErrorResponse, InitializeChunksRequest,
    InitializeChunksResponse, MessageResponse, PeerCounters, PeerId, PeersResponse, PortRequest,
    ReportStatsRequest, RequestChunkRequest, RequestChunkResponse, TorrentInfo, TorrentRequest,
    TransferStats, UpdateChunkRequest, UpdateChunkResponse,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Tracker API client
///
/// Every call carries the caller's listening port; the tracker combines it
/// with the connection's source address to identify the peer.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    client: Client,
    base_url: String,
}

impl TrackerClient {
    /// Create a client for the tracker at `url`
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidUrl`] unless `url` is http(s).
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(crate::TRACKER_HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Tracker base URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Register this peer
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or rejects the request.
    pub async fn register(&self, port: u16) -> Result<Registration, TrackerError> {
        let resp = self
            .client
            .post(self.endpoint("register"))
            .json(&PortRequest { port: Some(port) })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CREATED {
            return Ok(Registration::Registered);
        }

        let body = resp.text().await?;
        if status == StatusCode::BAD_REQUEST
            && serde_json::from_str::<MessageResponse>(&body).is_ok()
        {
            return Ok(Registration::AlreadyRegistered);
        }
        Err(api_error(status, &body))
    }

    /// Registered peers other than this one
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or rejects the request.
    pub async fn peers(&self, port: u16) -> Result<Vec<PeerId>, TrackerError> {
        let resp = self
            .client
            .get(self.endpoint("peers"))
            .json(&PortRequest { port: Some(port) })
            .send()
            .await?;

        let body: PeersResponse = decode(resp).await?;
        Ok(body.available_peers)
    }

    /// Publish the availability matrix of a freshly seeded file
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or rejects the matrix.
    pub async fn initialize_chunks(
        &self,
        file_id: &str,
        total_chunks: u32,
        chunk_data: ChunkMatrix,
        port: u16,
    ) -> Result<ChunkMatrix, TrackerError> {
        let resp = self
            .client
            .post(self.endpoint("initialize_chunks"))
            .json(&InitializeChunksRequest {
                file_id: file_id.to_string(),
                file_size: total_chunks,
                chunk_data,
                port,
            })
            .send()
            .await?;

        let body: InitializeChunksResponse = decode(resp).await?;
        Ok(body.torrent_info)
    }

    /// Report a newly held chunk
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or rejects the update.
    pub async fn update_chunk(
        &self,
        file_id: &str,
        port: u16,
        chunk_id: u32,
    ) -> Result<ChunkMatrix, TrackerError> {
        let resp = self
            .client
            .post(self.endpoint("update_chunk"))
            .json(&UpdateChunkRequest {
                file_id: file_id.to_string(),
                port,
                chunk_id,
            })
            .send()
            .await?;

        let body: UpdateChunkResponse = decode(resp).await?;
        Ok(body.chunk_data)
    }

    /// Ask for the rarest missing chunk and a holder
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or the torrent is unknown.
    pub async fn request_chunk(
        &self,
        file_id: &str,
        port: u16,
    ) -> Result<ChunkAssignment, TrackerError> {
        let resp = self
            .client
            .get(self.endpoint("request_chunk"))
            .json(&RequestChunkRequest {
                file_id: file_id.to_string(),
                port,
            })
            .send()
            .await?;

        let body: RequestChunkResponse = decode(resp).await?;
        Ok(body.into())
    }

    /// Full bookkeeping of one torrent
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or the torrent is unknown.
    pub async fn torrent(&self, file_id: &str) -> Result<TorrentInfo, TrackerError> {
        let resp = self
            .client
            .get(self.endpoint("torrent"))
            .json(&TorrentRequest {
                file_id: file_id.to_string(),
            })
            .send()
            .await?;

        decode(resp).await
    }

    /// Per-peer counters
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable.
    pub async fn stats(&self) -> Result<BTreeMap<PeerId, PeerCounters>, TrackerError> {
        let resp = self.client.get(self.endpoint("stats")).send().await?;
        decode(resp).await
    }

    /// Push this peer's local counters
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is unreachable or rejects the report.
    pub async fn report_stats(&self, port: u16, stats: TransferStats) -> Result<(), TrackerError> {
        let resp = self
            .client
            .post(self.endpoint("report_stats"))
            .json(&ReportStatsRequest { port, stats })
            .send()
            .await?;

        let _: MessageResponse = decode(resp).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, TrackerError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(api_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| TrackerError::InvalidResponse(e.to_string()))
}

fn api_error(status: StatusCode, body: &str) -> TrackerError {
    let (kind, message) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => (err.kind, err.error),
        Err(_) => (None, body.to_string()),
    };

    TrackerError::Api {
        status: status.as_u16(),
        kind,
        message,
    }
}
