//! HTTP delivery to Alertmanager

use super::{AlertSink, AlertmanagerAlert};
use crate::error::{DispatchError, DispatchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Path alerts are posted to, relative to the Alertmanager base URL
pub const ALERTS_PATH: &str = "api/v1/alerts";

/// Posts alert batches as a JSON array
pub struct AlertmanagerClient {
    client: Client,
    alerts_url: Url,
}

impl AlertmanagerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = Url::parse(base_url).context("Invalid Alertmanager URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let alerts_url = base.join(ALERTS_PATH).context("Invalid Alertmanager URL")?;

        Ok(Self { client, alerts_url })
    }

    pub fn alerts_url(&self) -> &Url {
        &self.alerts_url
    }
}

#[async_trait]
impl AlertSink for AlertmanagerClient {
    async fn send(&self, alerts: &[AlertmanagerAlert]) -> DispatchResult<()> {
        let response = self
            .client
            .post(self.alerts_url.clone())
            .json(alerts)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::alert_for;
    use crate::models::{Anomaly, DeviceKey};
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn alerts() -> Vec<AlertmanagerAlert> {
        vec![alert_for(&Anomaly {
            device: DeviceKey::new("node-1", "eth0"),
            traffic: 1.0,
            errors: 2.0,
            score: -0.5,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        })]
    }

    fn client(url: &str) -> AlertmanagerClient {
        AlertmanagerClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_alerts_url() {
        assert_eq!(
            client("http://localhost:9093").alerts_url().as_str(),
            "http://localhost:9093/api/v1/alerts"
        );
    }

    #[tokio::test]
    async fn test_posts_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/alerts")
            .match_header("content-type", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r"^\[\{".to_string()),
                Matcher::Regex(r#""alertname":"NetworkTrafficAnomaly""#.to_string()),
                Matcher::Regex(r#""device":"node-1_eth0""#.to_string()),
                Matcher::Regex(r#""startsAt":"2024-01-01T00:00:00Z""#.to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        client(&server.url()).send(&alerts()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_200_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/alerts")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = client(&server.url()).send(&alerts()).await.unwrap_err();
        match err {
            DispatchError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_accepted_status_is_still_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/alerts")
            .with_status(202)
            .create_async()
            .await;

        let err = client(&server.url()).send(&alerts()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Status { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = client(&format!("http://127.0.0.1:{port}"))
            .send(&alerts())
            .await
            .unwrap_err();
        match err {
            DispatchError::Transport(source) => assert!(source.is_connect()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepted by the kernel backlog but never answered
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let client = AlertmanagerClient::new(&url, Duration::from_millis(200)).unwrap();
        let err = client.send(&alerts()).await.unwrap_err();
        match err {
            DispatchError::Transport(source) => assert!(source.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
