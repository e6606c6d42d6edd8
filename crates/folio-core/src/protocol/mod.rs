//! Sync protocol client
//!
//! Wire types and the transport seam for the upload/download exchange
//! with the remote sync service. The transport trait abstracts the HTTP
//! layer so tests can script responses; [`HttpSyncClient`] is the real
//! implementation.
//!
//! Neither operation retries internally. An upload batch is built from
//! immutable log entries, so re-sending the same set after an ambiguous
//! failure is safe: the server deduplicates by
//! `(deviceId, entityType, entityId, timestamp)`.

mod http;

pub use http::HttpSyncClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gateway::ResilientGateway;
use crate::models::{ChangeAction, ChangeLogEntry, EntityType};

/// Wire representation of a change log entry.
///
/// Same fields as [`ChangeLogEntry`] minus the local-only `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    /// The acting user on the originating device
    pub actor_name: String,
    /// What happened
    pub action: ChangeAction,
    /// Which entity kind was touched
    pub entity_type: EntityType,
    /// Which entity was touched
    pub entity_id: String,
    /// Snapshot before the mutation, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    /// Snapshot after the mutation, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    /// When the mutation was recorded on the originating device
    pub timestamp: DateTime<Utc>,
}

impl From<&ChangeLogEntry> for RemoteChange {
    fn from(entry: &ChangeLogEntry) -> Self {
        Self {
            actor_name: entry.actor_name.clone(),
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            old_value: entry.old_value.clone(),
            new_value: entry.new_value.clone(),
            timestamp: entry.timestamp,
        }
    }
}

/// Body of `POST /sync/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Originating device
    pub device_id: String,
    /// Client clock at the time of the request
    pub timestamp: DateTime<Utc>,
    /// The batch, oldest first
    pub changes: Vec<RemoteChange>,
}

/// Acknowledgment body of a successful upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAck {
    /// How many changes the server accepted
    #[serde(default)]
    pub accepted: usize,
}

/// Body of the `GET /sync/download` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// Changes from other devices since the requested instant
    #[serde(default)]
    pub changes: Vec<RemoteChange>,
}

/// Network seam for the sync exchange
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    /// Send a batch of local changes as a single request
    async fn upload(&self, request: &UploadRequest) -> Result<UploadAck>;

    /// Fetch changes from other devices since `since`.
    ///
    /// The server excludes changes originating from `device_id` to avoid
    /// echoing the caller's own uploads back.
    async fn download(
        &self,
        since: Option<DateTime<Utc>>,
        device_id: &str,
    ) -> Result<DownloadResponse>;
}

impl<T: SyncTransport> SyncTransport for std::sync::Arc<T> {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadAck> {
        (**self).upload(request).await
    }

    async fn download(
        &self,
        since: Option<DateTime<Utc>>,
        device_id: &str,
    ) -> Result<DownloadResponse> {
        (**self).download(since, device_id).await
    }
}

/// The sync protocol client: builds wire requests from log entries and
/// routes every call through the resilient gateway.
pub struct SyncClient<T: SyncTransport> {
    transport: T,
    gateway: ResilientGateway,
}

impl<T: SyncTransport> SyncClient<T> {
    /// Create a client over the given transport and gateway
    pub const fn new(transport: T, gateway: ResilientGateway) -> Self {
        Self { transport, gateway }
    }

    /// Serialize `batch` with the device id and a client timestamp and
    /// send it as a single request
    pub async fn upload(&self, device_id: &str, batch: &[ChangeLogEntry]) -> Result<UploadAck> {
        let request = UploadRequest {
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            changes: batch.iter().map(RemoteChange::from).collect(),
        };

        self.gateway
            .run("sync.upload", self.transport.upload(&request))
            .await
    }

    /// Request all changes from other devices since `since`
    pub async fn download(
        &self,
        since: Option<DateTime<Utc>>,
        device_id: &str,
    ) -> Result<DownloadResponse> {
        self.gateway
            .run("sync.download", self.transport.download(since, device_id))
            .await
    }
}

/// Scriptable transport for tests: records every request and replays
/// configured responses or single-shot failures.
#[derive(Default)]
pub struct MockTransport {
    uploads: parking_lot::Mutex<Vec<UploadRequest>>,
    download_calls: parking_lot::Mutex<Vec<(Option<DateTime<Utc>>, String)>>,
    download_changes: parking_lot::Mutex<Vec<RemoteChange>>,
    upload_failure: parking_lot::Mutex<Option<crate::error::Error>>,
    download_failure: parking_lot::Mutex<Option<crate::error::Error>>,
}

impl MockTransport {
    /// Create a mock that succeeds with an empty download
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the changes returned by subsequent downloads
    pub fn set_download_changes(&self, changes: Vec<RemoteChange>) {
        *self.download_changes.lock() = changes;
    }

    /// Fail the next upload with `error`
    pub fn fail_next_upload(&self, error: crate::error::Error) {
        *self.upload_failure.lock() = Some(error);
    }

    /// Fail the next download with `error`
    pub fn fail_next_download(&self, error: crate::error::Error) {
        *self.download_failure.lock() = Some(error);
    }

    /// Every upload request received so far
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.uploads.lock().clone()
    }

    /// Every `(since, device_id)` pair downloads were requested with
    #[must_use]
    pub fn download_requests(&self) -> Vec<(Option<DateTime<Utc>>, String)> {
        self.download_calls.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadAck> {
        if let Some(error) = self.upload_failure.lock().take() {
            return Err(error);
        }
        let accepted = request.changes.len();
        self.uploads.lock().push(request.clone());
        Ok(UploadAck { accepted })
    }

    async fn download(
        &self,
        since: Option<DateTime<Utc>>,
        device_id: &str,
    ) -> Result<DownloadResponse> {
        if let Some(error) = self.download_failure.lock().take() {
            return Err(error);
        }
        self.download_calls
            .lock()
            .push((since, device_id.to_string()));
        Ok(DownloadResponse {
            changes: self.download_changes.lock().clone(),
        })
    }
}
