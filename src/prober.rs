//! HTTP probing and outcome classification (spec.md §4.4 step 1).
//!
//! Grounded on the teacher's `actors::service_monitor`, which owns a
//! `reqwest::Client` and turns a response (or error) into a typed outcome
//! before handing it to storage; generalized here to the single
//! expected-status-code rule of spec.md rather than the teacher's
//! multi-field health check.

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::warn;

use crate::store::Endpoint;

/// The result of probing one endpoint once.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub status_code: i32,
    pub response_time_ms: f64,
    pub error_reason: Option<String>,
}

/// Probes endpoints over HTTP(S). Holds one shared `reqwest::Client` so
/// connections are pooled across endpoints, the way the teacher shares one
/// client across `ServiceMonitorActor` instances.
#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new() -> Self {
        let client = Client::builder()
            .build()
            .expect("reqwest client with default TLS backend must build");
        Self { client }
    }

    /// GET `endpoint.url`, bounded by `endpoint.timeout` seconds, and
    /// classify the result:
    /// - a response whose status equals `expectedStatus` is UP;
    /// - any other response status is DOWN with the observed code recorded;
    /// - a timeout or transport error is DOWN with `status_code = 0` and a
    ///   human-readable `error_reason`.
    #[tracing::instrument(skip(self), fields(endpoint = %endpoint.name))]
    pub async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let timeout = Duration::from_secs(endpoint.timeout.max(0) as u64);
        let started = Instant::now();

        let result = self
            .client
            .get(&endpoint.url)
            .timeout(timeout)
            .send()
            .await;

        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16() as i32;
                let success = status_code == endpoint.expected_status;
                ProbeOutcome {
                    success,
                    status_code,
                    response_time_ms,
                    error_reason: if success {
                        None
                    } else {
                        Some(format!(
                            "Got {status_code}, expected {}",
                            endpoint.expected_status
                        ))
                    },
                }
            }
            Err(err) => {
                warn!(error = %err, "probe failed");
                let reason = if err.is_timeout() {
                    format!("Timeout after {}s", endpoint.timeout)
                } else if err.is_connect() {
                    format!("Connection failed: {err}")
                } else {
                    format!("Request failed: {err}")
                };
                ProbeOutcome {
                    success: false,
                    status_code: 0,
                    response_time_ms,
                    error_reason: Some(reason),
                }
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Severity;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: String, expected_status: i32, timeout: i32) -> Endpoint {
        Endpoint {
            id: Uuid::new_v4(),
            name: "svc".to_string(),
            url,
            check_interval: 30,
            timeout,
            expected_status,
            severity: Severity::Medium,
            enabled: true,
            tags: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn matching_status_is_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = Prober::new();
        let outcome = prober
            .probe(&endpoint(format!("{}/health", server.uri()), 200, 5))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, 200);
        assert!(outcome.error_reason.is_none());
    }

    #[tokio::test]
    async fn mismatched_status_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let prober = Prober::new();
        let outcome = prober
            .probe(&endpoint(format!("{}/health", server.uri()), 200, 5))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 500);
        assert!(outcome.error_reason.is_some());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let prober = Prober::new();
        let outcome = prober
            .probe(&endpoint(format!("{}/health", server.uri()), 200, 0))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 0);
    }
}
