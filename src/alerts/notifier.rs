//! Notifier backends - how an alert leaves the process
//!
//! - `LogNotifier`: writes the alert to the log stream only
//! - `WebhookNotifier`: POSTs the alert as JSON to the device endpoint
//!   (`webhook` feature)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Device;

/// Payload delivered to every device of an alerted subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("endpoint {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

#[cfg(feature = "webhook")]
impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Http(err.to_string())
    }
}

/// Trait for alert delivery backends
///
/// Implementations must be thread-safe (Send + Sync). A failed delivery is
/// reported to the caller, which logs it and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, device: &Device, message: &AlertMessage) -> Result<(), DispatchError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

// ============================================================================
// Log
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, device: &Device, message: &AlertMessage) -> Result<(), DispatchError> {
        info!(
            endpoint = %device.endpoint,
            title = %message.title,
            body = %message.body,
            "🔔 Alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// ============================================================================
// Webhook
// ============================================================================

/// JSON POST to the device endpoint. Device credentials become headers.
#[cfg(feature = "webhook")]
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

#[cfg(feature = "webhook")]
impl WebhookNotifier {
    pub fn new(timeout: std::time::Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, device: &Device, message: &AlertMessage) -> Result<(), DispatchError> {
        let url = reqwest::Url::parse(&device.endpoint)
            .map_err(|e| DispatchError::InvalidEndpoint(format!("{}: {e}", device.endpoint)))?;

        let mut request = self.http.post(url).header("TTL", "60").header("Urgency", "high");
        for (name, value) in &device.credentials {
            request = request.header(name.as_str(), value.as_str());
        }
        let resp = request.json(message).send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::Status {
                endpoint: device.endpoint.clone(),
                status: status.as_u16(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> AlertMessage {
        AlertMessage {
            title: "Storm nearby".into(),
            body: "probable hail 4.2 km away".into(),
            data: serde_json::json!({ "url": "/" }),
        }
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let device = Device {
            endpoint: "anything".into(),
            credentials: Default::default(),
        };
        assert!(LogNotifier.deliver(&device, &message()).await.is_ok());
    }

    #[cfg(feature = "webhook")]
    #[tokio::test]
    async fn test_webhook_rejects_invalid_endpoint() {
        let notifier = WebhookNotifier::new(std::time::Duration::from_secs(1)).unwrap();
        let device = Device {
            endpoint: "not a url".into(),
            credentials: Default::default(),
        };
        let err = notifier.deliver(&device, &message()).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidEndpoint(_)));
    }

    #[cfg(feature = "webhook")]
    #[tokio::test]
    async fn test_webhook_posts_json_and_maps_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut received = Vec::new();
            // Read until the JSON body has arrived.
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if received.ends_with(b"}") {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 410 Gone\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let notifier = WebhookNotifier::new(std::time::Duration::from_secs(5)).unwrap();
        let mut credentials = std::collections::BTreeMap::new();
        credentials.insert("authorization".to_string(), "Bearer abc".to_string());
        let device = Device {
            endpoint: format!("http://{addr}/push"),
            credentials,
        };
        let err = notifier.deliver(&device, &message()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Status { status: 410, .. }));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /push"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer abc"));
        assert!(request.contains("\"title\":\"Storm nearby\""));
    }
}
