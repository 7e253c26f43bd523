//! HTTP client for the guard staging server

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::messages::{
    AnnotatorStat, ClaimOutcome, ErrorBody, MyTaskStats, ProposalSummary, ReleaseOutcome,
    SyncOutcome, TaskOverview,
};

const API_PREFIX: &str = "api/v1/staging";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

/// Staging API client acting as one identity
pub struct StagingClient {
    client: Client,
    base_url: Url,
    user: String,
    role: String,
}

impl StagingClient {
    pub fn new(
        server: &str,
        user: impl Into<String>,
        role: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(server)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            user: user.into(),
            role: role.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!("{}/{}", API_PREFIX, path))?)
    }

    fn with_identity(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-guard-user", &self.user)
            .header("x-guard-role", &self.role)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error.code, body.error.message),
            Err(_) => ("unknown".to_string(), text),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    pub async fn claim(
        &self,
        task_type: &str,
        batch_size: Option<u32>,
    ) -> Result<ClaimOutcome, ClientError> {
        tracing::debug!(task_type, ?batch_size, "claiming batch");
        let body = serde_json::json!({
            "task_type": task_type,
            "batch_size": batch_size,
        });
        let response = self
            .with_identity(self.client.post(self.endpoint("claim")?))
            .json(&body)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn release_expired(&self) -> Result<ReleaseOutcome, ClientError> {
        let response = self
            .with_identity(self.client.post(self.endpoint("release-expired")?))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn overview(&self, task_type: &str) -> Result<TaskOverview, ClientError> {
        let response = self
            .with_identity(self.client.get(self.endpoint("overview")?))
            .query(&[("task_type", task_type)])
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn my_stats(&self, task_type: &str) -> Result<MyTaskStats, ClientError> {
        let response = self
            .with_identity(self.client.get(self.endpoint("my-tasks/stats")?))
            .query(&[("task_type", task_type)])
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn annotators(&self, task_type: &str) -> Result<Vec<AnnotatorStat>, ClientError> {
        let response = self
            .with_identity(self.client.get(self.endpoint("stats/annotators")?))
            .query(&[("task_type", task_type)])
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn list(
        &self,
        task_type: &str,
        status: Option<&str>,
        mine: bool,
        limit: i64,
    ) -> Result<Vec<ProposalSummary>, ClientError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        if mine {
            query.push(("mine", "true".to_string()));
        }

        let response = self
            .with_identity(
                self.client
                    .get(self.endpoint(&format!("proposals/{}", task_type))?),
            )
            .query(&query)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn sync_all(
        &self,
        task_type: &str,
        scenario_id: Option<&str>,
    ) -> Result<SyncOutcome, ClientError> {
        let mut builder = self.with_identity(
            self.client
                .post(self.endpoint(&format!("proposals/{}/sync-all", task_type))?),
        );
        if let Some(scenario_id) = scenario_id {
            builder = builder.query(&[("scenario_id", scenario_id)]);
        }
        Self::parse(builder.send().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_with_base_path() {
        let client =
            StagingClient::new("http://localhost:3000/guard", "alice", "annotator").unwrap();
        assert_eq!(
            client.endpoint("claim").unwrap().as_str(),
            "http://localhost:3000/guard/api/v1/staging/claim"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(matches!(
            StagingClient::new("not a url", "alice", "annotator"),
            Err(ClientError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_sends_identity() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/staging/claim"))
            .and(header("x-guard-user", "alice"))
            .and(header("x-guard-role", "annotator"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "claimed_count": 1,
                "claimed_ids": ["550e8400-e29b-41d4-a716-446655440000"],
                "batch_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
                "expires_at": "2026-01-10T00:30:00Z",
                "timeout_minutes": 30
            })))
            .mount(&mock_server)
            .await;

        let client = StagingClient::new(&mock_server.uri(), "alice", "annotator").unwrap();
        let outcome = client.claim("keywords", Some(5)).await.unwrap();

        assert_eq!(outcome.claimed_count, 1);
        assert_eq!(outcome.timeout_minutes, 30);
    }

    #[tokio::test]
    async fn test_overview_passes_task_type() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/staging/overview"))
            .and(query_param("task_type", "rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "pending_count": 90,
                "claimed_count": 0,
                "reviewed_count": 5,
                "synced_count": 0,
                "ignored_count": 5,
                "total_count": 100
            })))
            .mount(&mock_server)
            .await;

        let client = StagingClient::new(&mock_server.uri(), "eve", "auditor").unwrap();
        let overview = client.overview("rules").await.unwrap();
        assert_eq!(overview.pending_count, 90);
        assert_eq!(overview.total_count, 100);
    }

    #[tokio::test]
    async fn test_api_error_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/staging/proposals/keywords/sync-all"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": "unauthorized", "message": "alice lacks capability: sync"}
            })))
            .mount(&mock_server)
            .await;

        let client = StagingClient::new(&mock_server.uri(), "alice", "annotator").unwrap();
        match client.sync_all("keywords", None).await.unwrap_err() {
            ClientError::Api { status, code, .. } => {
                assert_eq!(status, 403);
                assert_eq!(code, "unauthorized");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/staging/release-expired"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let client = StagingClient::new(&mock_server.uri(), "ops", "system_admin").unwrap();
        match client.release_expired().await.unwrap_err() {
            ClientError::Api { code, message, .. } => {
                assert_eq!(code, "unknown");
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_mine_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/staging/proposals/keywords"))
            .and(query_param("mine", "true"))
            .and(query_param("status", "CLAIMED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": "550e8400-e29b-41d4-a716-446655440000",
                "kind": "keyword",
                "keyword": "casino",
                "status": "CLAIMED",
                "claimed_by": "alice"
            }])))
            .mount(&mock_server)
            .await;

        let client = StagingClient::new(&mock_server.uri(), "alice", "annotator").unwrap();
        let rows = client
            .list("keywords", Some("CLAIMED"), true, 20)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject(), "casino");
    }
}
