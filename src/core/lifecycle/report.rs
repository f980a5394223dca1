//! End-of-call results reporting.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::EndReason;

/// Value of the report's `type` field.
pub const END_OF_CALL_REPORT: &str = "end-of-call-report";

/// Default timeout for the results POST.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload posted to the results collector when a call ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    #[serde(rename = "type")]
    pub report_type: String,
    /// External call identifier supplied at session creation
    pub call_id: String,
    /// Telephony provider's call identifier
    pub call_sid: Option<String>,
    /// Newline-joined `"<Label>: <text>"` lines
    pub transcript: String,
    /// Whole seconds since session creation
    pub duration: u64,
    pub ended_reason: EndReason,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Results request to {url} failed: {error}")]
    Request { url: String, error: String },

    #[error("Results collector at {url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

/// Destination for end-of-call reports.
#[async_trait]
pub trait ResultsReporter: Send + Sync {
    async fn send(&self, report: &CallReport) -> Result<(), ReportError>;
}

/// Posts reports as JSON to a fixed URL. One attempt, no retry.
pub struct HttpResultsReporter {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpResultsReporter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_REPORT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ResultsReporter for HttpResultsReporter {
    async fn send(&self, report: &CallReport) -> Result<(), ReportError> {
        debug!(url = %self.url, call_id = %report.call_id, "Posting end-of-call report");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(report)
            .send()
            .await
            .map_err(|e| ReportError::Request {
                url: self.url.clone(),
                error: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Status {
                url: self.url.clone(),
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
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> CallReport {
        CallReport {
            report_type: END_OF_CALL_REPORT.to_string(),
            call_id: "c-1".to_string(),
            call_sid: Some("CA1".to_string()),
            transcript: "Agent: Hi\nUser: Hello".to_string(),
            duration: 42,
            ended_reason: EndReason::CallEnded,
        }
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "end-of-call-report",
                "callId": "c-1",
                "callSid": "CA1",
                "transcript": "Agent: Hi\nUser: Hello",
                "duration": 42,
                "endedReason": "call_ended"
            })
        );
    }

    #[test]
    fn test_reporter_builder() {
        let reporter = HttpResultsReporter::new("https://example.com/results")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(reporter.url(), "https://example.com/results");
        assert_eq!(reporter.timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_http_reporter_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/results"))
            .and(body_partial_json(serde_json::json!({
                "type": "end-of-call-report",
                "callId": "c-1",
                "endedReason": "call_ended"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = HttpResultsReporter::new(format!("{}/results", server.uri()));
        reporter.send(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_reporter_surfaces_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let reporter = HttpResultsReporter::new(server.uri());
        match reporter.send(&report()).await {
            Err(ReportError::Status { status, body, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_reporter_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let reporter =
            HttpResultsReporter::new(server.uri()).with_timeout(Duration::from_millis(100));
        assert!(matches!(
            reporter.send(&report()).await,
            Err(ReportError::Request { .. })
        ));
    }
}
