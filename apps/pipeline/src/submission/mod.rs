//! Outbound submission channel.
//!
//! The pipeline hands a finished application packet to an external submission service
//! (which owns SMTP delivery and browser automation) through `SubmissionChannel`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::SubmissionMethod;
use crate::resilience::Retryable;

const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Submission rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Submission timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Submission service error (status {status}): {message}")]
    Server { status: u16, message: String },
}

impl Retryable for SubmissionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionError::Timeout
                | SubmissionError::Connection(_)
                | SubmissionError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for SubmissionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SubmissionError::Timeout
        } else {
            SubmissionError::Connection(err.to_string())
        }
    }
}

/// Classifies a non-success response from the submission service.
pub fn classify_status(status: u16, message: String) -> SubmissionError {
    match status {
        401 | 403 => SubmissionError::Auth(message),
        400 | 422 => SubmissionError::InvalidRecipient(message),
        408 | 429 | 500..=599 => SubmissionError::Server { status, message },
        _ => SubmissionError::Rejected { status, message },
    }
}

/// Everything the submission service needs to send one application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionPacket {
    pub application_id: Uuid,
    pub job_id: Uuid,
    pub method: SubmissionMethod,
    pub recipient: String,
    pub company: String,
    pub job_title: String,
    pub cv: String,
    pub cover_letter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub reference: Option<String>,
}

#[async_trait]
pub trait SubmissionChannel: Send + Sync {
    async fn submit(&self, packet: &SubmissionPacket) -> Result<SubmissionReceipt, SubmissionError>;
}

/// Posts packets as JSON to the configured submission service.
#[derive(Clone)]
pub struct WebhookSubmissionChannel {
    client: Client,
    endpoint: String,
}

impl WebhookSubmissionChannel {
    pub fn new(endpoint: String) -> Result<Self, SubmissionError> {
        Ok(Self {
            client: Client::builder().timeout(SUBMISSION_TIMEOUT).build()?,
            endpoint,
        })
    }
}

#[async_trait]
impl SubmissionChannel for WebhookSubmissionChannel {
    async fn submit(
        &self,
        packet: &SubmissionPacket,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let response = self.client.post(&self.endpoint).json(packet).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        // The service accepted the packet; a missing or odd body only loses the reference.
        let receipt = response.json::<SubmissionReceipt>().await.unwrap_or_default();
        debug!(
            "Submitted application {} via {} (reference: {:?})",
            packet.application_id,
            packet.method.as_str(),
            receipt.reference
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let msg = || "body".to_string();
        assert!(matches!(classify_status(401, msg()), SubmissionError::Auth(_)));
        assert!(matches!(classify_status(403, msg()), SubmissionError::Auth(_)));
        assert!(matches!(
            classify_status(422, msg()),
            SubmissionError::InvalidRecipient(_)
        ));
        assert!(matches!(
            classify_status(502, msg()),
            SubmissionError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(409, msg()),
            SubmissionError::Rejected { status: 409, .. }
        ));
    }

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(SubmissionError::Timeout.is_retryable());
        assert!(SubmissionError::Connection("refused".into()).is_retryable());
        assert!(classify_status(503, String::new()).is_retryable());
        assert!(classify_status(429, String::new()).is_retryable());

        assert!(!SubmissionError::Auth("bad key".into()).is_retryable());
        assert!(!SubmissionError::InvalidRecipient("no mailbox".into()).is_retryable());
        assert!(!classify_status(409, String::new()).is_retryable());
    }

    #[test]
    fn test_packet_serializes_method_in_snake_case() {
        let packet = SubmissionPacket {
            application_id: Uuid::nil(),
            job_id: Uuid::nil(),
            method: SubmissionMethod::WebForm,
            recipient: "https://jobs.example/apply".into(),
            company: "Acme Data".into(),
            job_title: "Data Engineer".into(),
            cv: "cv".into(),
            cover_letter: "letter".into(),
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["method"], "web_form");
    }
}
