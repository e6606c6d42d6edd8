//! HTTP transport for the sync protocol

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{DownloadResponse, SyncTransport, UploadAck, UploadRequest};
use crate::config::SyncConfig;
use crate::error::{Error, Result};

/// reqwest-backed [`SyncTransport`].
///
/// Attaches the bearer credential to both endpoints and applies the
/// configured per-request timeout at the client level.
pub struct HttpSyncClient {
    endpoint: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpSyncClient {
    /// Build a transport from the sync configuration
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::Network(error.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    fn map_request_error(error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_error_message(status, &body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth(message)),
            _ => Err(Error::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

impl SyncTransport for HttpSyncClient {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadAck> {
        let response = self
            .client
            .post(format!("{}/sync/upload", self.endpoint))
            .bearer_auth(&self.auth_token)
            .json(request)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let response = Self::check_status(response).await?;
        let body = response.text().await.unwrap_or_default();
        parse_upload_ack(&body)
    }

    async fn download(
        &self,
        since: Option<DateTime<Utc>>,
        device_id: &str,
    ) -> Result<DownloadResponse> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(2);
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339()));
        }
        query.push(("device", device_id.to_string()));

        let response = self
            .client
            .get(format!("{}/sync/download", self.endpoint))
            .query(&query)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let response = Self::check_status(response).await?;
        let body = response.text().await.unwrap_or_default();
        parse_download_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn parse_upload_ack(body: &str) -> Result<UploadAck> {
    // Some deployments acknowledge with an empty 2xx body.
    if body.trim().is_empty() {
        return Ok(UploadAck::default());
    }
    Ok(serde_json::from_str(body)?)
}

fn parse_download_response(body: &str) -> Result<DownloadResponse> {
    if body.trim().is_empty() {
        return Ok(DownloadResponse::default());
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_message_prefers_json_fields() {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(
            parse_error_message(status, r#"{"message": " sync table missing "}"#),
            "sync table missing"
        );
        assert_eq!(
            parse_error_message(status, r#"{"error": "quota exceeded"}"#),
            "quota exceeded"
        );
    }

    #[test]
    fn error_message_falls_back_to_body_then_status() {
        let status = StatusCode::BAD_GATEWAY;
        assert_eq!(parse_error_message(status, "upstream down"), "upstream down");
        assert_eq!(parse_error_message(status, "   "), "HTTP 502");
    }

    #[test]
    fn upload_ack_tolerates_empty_body() {
        assert_eq!(parse_upload_ack("").unwrap(), UploadAck::default());
        assert_eq!(
            parse_upload_ack(r#"{"accepted": 4}"#).unwrap(),
            UploadAck { accepted: 4 }
        );
    }

    #[test]
    fn download_response_parses_changes() {
        let body = r#"{
            "changes": [{
                "actorName": "jose",
                "action": "UPDATE",
                "entityType": "provider",
                "entityId": "prov-1",
                "newValue": {"name": "Acme"},
                "timestamp": "2024-05-01T12:00:00Z"
            }]
        }"#;

        let response = parse_download_response(body).unwrap();
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].entity_id, "prov-1");

        assert!(parse_download_response("").unwrap().changes.is_empty());
        assert!(parse_download_response("not json").is_err());
    }

    #[test]
    fn client_construction_uses_config_endpoint() {
        let config = SyncConfig::new("https://sync.folio.example/", "token").unwrap();
        let client = HttpSyncClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://sync.folio.example");
    }
}
