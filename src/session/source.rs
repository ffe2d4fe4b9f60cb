//! Where a session descriptor comes from.

use crate::error::{LiveTransError, Result};
use crate::session::descriptor::SessionConfig;
use async_trait::async_trait;
use std::path::PathBuf;

/// Resolves the [`SessionConfig`] during the configuring phase.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn resolve(&self) -> Result<SessionConfig>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Descriptor stored in a JSON file.
pub struct FileSessionSource {
    path: PathBuf,
}

impl FileSessionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionSource for FileSessionSource {
    async fn resolve(&self) -> Result<SessionConfig> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LiveTransError::SessionSource {
                message: format!("cannot read {}: {}", self.path.display(), e),
            })?;
        SessionConfig::from_json(&text)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Descriptor carried as a room metadata string.
pub struct MetadataSessionSource {
    metadata: String,
}

impl MetadataSessionSource {
    pub fn new(metadata: impl Into<String>) -> Self {
        Self {
            metadata: metadata.into(),
        }
    }
}

#[async_trait]
impl SessionSource for MetadataSessionSource {
    async fn resolve(&self) -> Result<SessionConfig> {
        SessionConfig::from_json(&self.metadata)
    }

    fn describe(&self) -> String {
        "room metadata".to_string()
    }
}

/// Descriptor fetched from an event service by room name.
#[cfg(feature = "http")]
pub struct HttpSessionSource {
    base_url: String,
    room: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpSessionSource {
    pub fn new(base_url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            room: room.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `GET {base}/api/events/by-room/{room}`.
    pub fn url(&self) -> String {
        format!(
            "{}/api/events/by-room/{}",
            self.base_url.trim_end_matches('/'),
            self.room
        )
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl SessionSource for HttpSessionSource {
    async fn resolve(&self) -> Result<SessionConfig> {
        let url = self.url();
        tracing::info!(%url, "fetching event configuration");

        let response = self.client.get(&url).send().await.map_err(|e| {
            LiveTransError::SessionSource {
                message: format!("request to {} failed: {}", url, e),
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LiveTransError::SessionSource {
                message: format!("event not found for room {}", self.room),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LiveTransError::SessionSource {
                message: format!("HTTP {} from {}: {}", status, url, body.trim()),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| LiveTransError::SessionSource {
                message: format!("invalid event configuration: {}", e),
            })?;
        SessionConfig::from_value(&value)
    }

    fn describe(&self) -> String {
        self.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str =
        r#"{"sourceLanguage":"en-US","outputs":[{"lang":"es-ES","captions":true,"audio":true}]}"#;

    #[tokio::test]
    async fn test_file_source_reads_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, DESCRIPTOR).unwrap();

        let config = FileSessionSource::new(&path).resolve().await.unwrap();
        assert_eq!(config.source_language.as_str(), "en-US");
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let err = FileSessionSource::new("/nonexistent/session.json")
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, LiveTransError::SessionSource { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_metadata_source() {
        let config = MetadataSessionSource::new(DESCRIPTOR).resolve().await.unwrap();
        assert_eq!(config.audio_targets.len(), 1);

        let err = MetadataSessionSource::new("").resolve().await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_source_url() {
        let source = HttpSessionSource::new("https://events.example.com/", "room-7");
        assert_eq!(
            source.url(),
            "https://events.example.com/api/events/by-room/room-7"
        );
    }
    #[cfg(feature = "http")]
    async fn resolve_against(
        status: &'static str,
        body: &'static str,
    ) -> (Result<SessionConfig>, String) {
        let (url, server) = crate::http_stub::serve_once(status, body).await;
        let result = HttpSessionSource::new(url, "room-7").resolve().await;
        (result, server.await.unwrap())
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_source_fetches_by_room() {
        let (result, request) = resolve_against("200 OK", DESCRIPTOR).await;
        let config = result.unwrap();
        assert_eq!(config.source_language.as_str(), "en-US");
        assert_eq!(config.audio_targets.len(), 1);
        assert!(request.starts_with("GET /api/events/by-room/room-7 "));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_source_unknown_room() {
        let (result, _) = resolve_against("404 Not Found", "{}").await;
        let err = result.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("room-7"), "{}", err);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_source_server_error() {
        let (result, _) = resolve_against("503 Service Unavailable", r#"{"error":"down"}"#).await;
        let err = result.unwrap_err();
        assert!(matches!(err, LiveTransError::SessionSource { .. }));
        assert!(err.to_string().contains("HTTP 503"), "{}", err);
        assert!(err.to_string().contains("down"), "{}", err);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_source_rejects_malformed_body() {
        let (result, _) = resolve_against("200 OK", "not json").await;
        assert!(result.unwrap_err().is_configuration());

        let (result, _) = resolve_against("200 OK", r#"{"outputs":[]}"#).await;
        assert!(result.unwrap_err().is_configuration());
    }
}
