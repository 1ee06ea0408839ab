//! Form Recognizer layout analysis submission. Fire-and-forget: the result is never polled.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::info;

use crate::config::AnalyzerConfig;
use crate::contract::{Analyzer, Submission};
use crate::error::AnalyzeError;

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";
/// Every file is submitted as PDF, whatever its extension.
pub const SUBMISSION_CONTENT_TYPE: &str = "application/pdf";

pub struct FormRecognizer {
    http: Client,
    config: AnalyzerConfig,
}

impl FormRecognizer {
    pub fn new(http: Client, config: AnalyzerConfig) -> Self {
        Self { http, config }
    }

    pub fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/v2.1/layout/analyze",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Analyzer for FormRecognizer {
    async fn submit(&self, name: &str, content: &[u8]) -> Result<Submission, AnalyzeError> {
        let resp = self
            .http
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.key)
            .header(CONTENT_TYPE, SUBMISSION_CONTENT_TYPE)
            .body(content.to_vec())
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::ACCEPTED {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalyzeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let operation_location = resp
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        info!(file = %name, operation_location = ?operation_location, "[ANALYZE] Processing started for file");
        Ok(Submission { operation_location })
    }
}
