//! Store HTTP Client
//!
//! Thin PostgREST client for the telemetry store. Batches go in as JSON
//! arrays with `Prefer: return=minimal`, the latest-state mirror upserts
//! with `resolution=merge-duplicates` on the vehicle signature column.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{RemoteStore, StoreError};
use crate::logic::dataset::{LabeledRecord, LatestState};

/// Store endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub readings_table: String,
    pub latest_table: String,
    /// Unique column the latest-state upsert merges on
    pub conflict_key: String,
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        use crate::constants;

        Self {
            url: constants::DEFAULT_STORE_URL.to_string(),
            api_key: constants::DEFAULT_STORE_KEY.to_string(),
            readings_table: constants::DEFAULT_READINGS_TABLE.to_string(),
            latest_table: constants::DEFAULT_LATEST_TABLE.to_string(),
            conflict_key: constants::LATEST_CONFLICT_KEY.to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Store API client
pub struct StoreClient {
    config: StoreConfig,
    http_client: reqwest::Client,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn map_send_error(e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let code = status.as_u16();
    if code == 429 {
        return Err(StoreError::RateLimited);
    }
    if status.is_server_error() {
        return Err(StoreError::Server(code));
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected { status: code, body })
}

impl RemoteStore for StoreClient {
    async fn insert_readings(&self, rows: &[LabeledRecord]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let url = self.table_url(&self.config.readings_table);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        check_status(response).await
    }

    async fn upsert_latest(&self, row: &LatestState) -> Result<(), StoreError> {
        let url = format!(
            "{}?on_conflict={}",
            self.table_url(&self.config.latest_table),
            self.config.conflict_key
        );

        // PostgREST upserts take an array body even for a single row
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(std::slice::from_ref(row))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        check_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use chrono::Utc;

    use super::*;
    use crate::logic::features::DerivedFeatures;
    use crate::logic::reading::ObdParameters;
    use crate::logic::stress::HealthTier;

    fn sample_row() -> LabeledRecord {
        LabeledRecord {
            timestamp: Utc::now(),
            session_id: "abcd1234".to_string(),
            vehicle_signature: "00112233445566778899aabbccddeeff".to_string(),
            sequence: 1,
            data_quality: 100,
            raw_parameters: ObdParameters {
                rpm: Some(900.0),
                ..Default::default()
            },
            derived_features: DerivedFeatures::default(),
            stress_score: 0,
            health_tier: HealthTier::Normal,
            ml_status: None,
            ml_confidence: None,
            ml_alerts: None,
        }
    }

    /// Accept one HTTP request, capture it, reply with the given status line.
    fn serve_once(status_line: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut captured = Vec::new();
            let mut buf = [0u8; 1024];

            // headers first
            let header_end = loop {
                let n = stream.read(&mut buf).unwrap();
                captured.extend_from_slice(&buf[..n]);
                if let Some(pos) = captured.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            // then the body, sized by Content-Length
            let head = String::from_utf8_lossy(&captured[..header_end]).to_string();
            let content_length: usize = head
                .lines()
                .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
                .and_then(|l| l.split(':').nth(1))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            while captured.len() < header_end + content_length {
                let n = stream.read(&mut buf).unwrap();
                captured.extend_from_slice(&buf[..n]);
            }

            let response = format!("{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();

            String::from_utf8_lossy(&captured).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn test_client(url: String) -> StoreClient {
        StoreClient::new(StoreConfig {
            url,
            api_key: "test-key".to_string(),
            timeout_seconds: 5,
            ..Default::default()
        })
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn insert_hits_readings_table_with_minimal_prefer() {
        let (url, server) = serve_once("HTTP/1.1 201 Created");
        let client = test_client(url);

        let result = block_on(client.insert_readings(&[sample_row()]));
        assert!(result.is_ok());

        // header names are lowercased on the wire
        let request = server.join().unwrap().to_lowercase();
        assert!(request.starts_with("post /rest/v1/sensor_readings http/1.1"));
        assert!(request.contains("apikey: test-key"));
        assert!(request.contains("prefer: return=minimal"));
        // body is a JSON array of flat rows
        assert!(request.contains("\"rpm\":900.0"));
    }

    #[test]
    fn upsert_targets_conflict_key() {
        let (url, server) = serve_once("HTTP/1.1 200 OK");
        let client = test_client(url);

        let latest = LatestState::from_record(&sample_row());
        let result = block_on(client.upsert_latest(&latest));
        assert!(result.is_ok());

        let request = server.join().unwrap().to_lowercase();
        assert!(request.starts_with("post /rest/v1/realtime_status?on_conflict=vehicle_signature"));
        assert!(request.contains("prefer: resolution=merge-duplicates,return=minimal"));
    }

    #[test]
    fn server_errors_are_transient() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable");
        let client = test_client(url);

        let err = block_on(client.insert_readings(&[sample_row()])).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, StoreError::Server(503)));
        assert!(err.is_transient());
    }

    #[test]
    fn bad_request_is_fatal() {
        let (url, server) = serve_once("HTTP/1.1 400 Bad Request");
        let client = test_client(url);

        let err = block_on(client.insert_readings(&[sample_row()])).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, StoreError::Rejected { status: 400, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        // no server needed, the client must not touch the network
        let client = test_client("http://127.0.0.1:1".to_string());
        assert!(block_on(client.insert_readings(&[])).is_ok());
    }

    #[test]
    fn connection_refused_maps_to_network_error() {
        let client = test_client("http://127.0.0.1:1".to_string());
        let err = block_on(client.insert_readings(&[sample_row()])).unwrap_err();
        assert!(err.is_transient());
    }
}
