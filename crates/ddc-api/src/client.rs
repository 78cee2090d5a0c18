use crate::job::{JobState, JobStatusResponse, SubmitResponse};
use ddc_core::error::CollectorError;
use ddc_core::secret::Secret;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// The three calls the exporter needs from the job service.
#[async_trait::async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a SQL statement, returning the job id.
    async fn submit(&self, sql: &str) -> Result<String, CollectorError>;

    async fn job_state(&self, job_id: &str) -> Result<JobState, CollectorError>;

    /// Raw result body of a finished job, capped at `limit` rows.
    async fn job_results(&self, job_id: &str, limit: u64) -> Result<Vec<u8>, CollectorError>;

    /// Where result bodies come from, for error messages.
    fn results_url(&self, job_id: &str, limit: u64) -> String;
}

/// `JobApi` over the server's REST endpoints, authenticated with a
/// personal access token.
pub struct RestClient {
    endpoint: String,
    token: Secret,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(endpoint: &str, token: Secret) -> Result<Self, CollectorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CollectorError::Http(format!("unable to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.token.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, CollectorError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| CollectorError::Http(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::Http(format!("unable to read response from {}: {}", url, e)))?;

        if !status.is_success() {
            return Err(CollectorError::Http(format!(
                "{} returned HTTP {}: {}",
                url,
                status,
                String::from_utf8_lossy(&body)
            )));
        }
        Ok(body.to_vec())
    }
}

/// Decode a response body, reporting the URL when the shape is wrong.
pub(crate) fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, CollectorError> {
    serde_json::from_slice(body).map_err(|e| CollectorError::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait::async_trait]
impl JobApi for RestClient {
    async fn submit(&self, sql: &str) -> Result<String, CollectorError> {
        let url = self.url("/api/v3/sql");
        debug!("submitting '{}'", sql);
        let request = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "sql": sql }));
        let body = self.send(&url, request).await?;
        let submitted: SubmitResponse = decode(&url, &body)?;
        Ok(submitted.id)
    }

    async fn job_state(&self, job_id: &str) -> Result<JobState, CollectorError> {
        let url = self.url(&format!("/api/v3/job/{}", job_id));
        let body = self.send(&url, self.http.get(&url)).await?;
        let status: JobStatusResponse = decode(&url, &body)?;
        Ok(JobState::parse(&status.job_state))
    }

    async fn job_results(&self, job_id: &str, limit: u64) -> Result<Vec<u8>, CollectorError> {
        let url = self.results_url(job_id, limit);
        self.send(&url, self.http.get(&url)).await
    }

    fn results_url(&self, job_id: &str, limit: u64) -> String {
        self.url(&format!("/apiv2/job/{}/data?offset=0&limit={}", job_id, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_dropped() {
        let client = RestClient::new("http://localhost:9047/", Secret::new("pat")).unwrap();
        assert_eq!(
            client.results_url("abc", 10),
            "http://localhost:9047/apiv2/job/abc/data?offset=0&limit=10"
        );
    }

    #[test]
    fn decode_reports_the_url() {
        let err = decode::<SubmitResponse>("http://x/api/v3/sql", b"not json").unwrap_err();
        match err {
            CollectorError::MalformedResponse { url, .. } => assert_eq!(url, "http://x/api/v3/sql"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
