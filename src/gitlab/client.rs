//! REST implementation of [`GitLabApi`] against the GitLab v4 API.
//!
//! Branch and pipeline management use a personal/project access token via
//! the `PRIVATE-TOKEN` header. Pipeline triggering uses the dedicated
//! trigger-token endpoint (`POST /projects/:id/trigger/pipeline`), which
//! accepts variables as form fields and reports errors as JSON
//! `message`/`error` bodies.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

use super::api::{GitLabApi, PipelineRecord, ProjectDetails};
use super::error::GitLabApiError;
use crate::types::{PipelineId, ProjectId};

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// A GitLab REST client.
#[derive(Clone)]
pub struct GitLabClient {
    http: Client,
    base_url: Url,
    access_token: String,
    trigger_token: String,
}

impl GitLabClient {
    /// Creates a client for `base_url` (e.g. `https://gitlab.com`).
    ///
    /// Every request carries `timeout`; a timed-out trigger call is a hard
    /// failure of the calling flow.
    pub fn new(
        base_url: &str,
        access_token: impl Into<String>,
        trigger_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GitLabApiError> {
        let http = Client::builder()
            .user_agent(concat!("pipeline-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| GitLabApiError::UnexpectedResponse(format!("invalid base URL: {e}")))?;

        Ok(GitLabClient {
            http,
            base_url,
            access_token: access_token.into(),
            trigger_token: trigger_token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GitLabApiError> {
        self.base_url
            .join(path)
            .map_err(|e| GitLabApiError::UnexpectedResponse(format!("invalid endpoint: {e}")))
    }

    /// Maps a non-2xx response to a structured [`GitLabApiError::Api`].
    async fn check(response: Response) -> Result<Response, GitLabApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GitLabApiError::from_response(status.as_u16(), &body))
    }
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens are deliberately omitted.
        f.debug_struct("GitLabClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn show_project(&self, project: ProjectId) -> Result<ProjectDetails, GitLabApiError> {
        let url = self.endpoint(&format!("api/v4/projects/{project}"))?;
        let response = self
            .http
            .get(url)
            .header(PRIVATE_TOKEN_HEADER, &self.access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn create_branch(
        &self,
        project: ProjectId,
        branch: &str,
        base_ref: &str,
    ) -> Result<(), GitLabApiError> {
        let url = self.endpoint(&format!("api/v4/projects/{project}/repository/branches"))?;
        let response = self
            .http
            .post(url)
            .header(PRIVATE_TOKEN_HEADER, &self.access_token)
            .query(&[("branch", branch), ("ref", base_ref)])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn trigger_pipeline(
        &self,
        project: ProjectId,
        git_ref: &str,
        variables: &[(String, String)],
    ) -> Result<PipelineId, GitLabApiError> {
        #[derive(serde::Deserialize)]
        struct TriggeredPipeline {
            id: PipelineId,
        }

        let url = self.endpoint(&format!("api/v4/projects/{project}/trigger/pipeline"))?;

        let mut form: Vec<(String, String)> = vec![
            ("token".to_string(), self.trigger_token.clone()),
            ("ref".to_string(), git_ref.to_string()),
        ];
        for (key, value) in variables {
            form.push((format!("variables[{key}]"), value.clone()));
        }

        let response = self.http.post(url).form(&form).send().await?;
        let response = Self::check(response).await?;
        let triggered: TriggeredPipeline = response.json().await?;
        Ok(triggered.id)
    }

    async fn list_pending_pipelines(
        &self,
        project: ProjectId,
        git_ref: &str,
    ) -> Result<Vec<PipelineRecord>, GitLabApiError> {
        let url = self.endpoint(&format!("api/v4/projects/{project}/pipelines"))?;
        let response = self
            .http
            .get(url)
            .header(PRIVATE_TOKEN_HEADER, &self.access_token)
            .query(&[("ref", git_ref), ("status", "pending")])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn cancel_pipeline(
        &self,
        project: ProjectId,
        pipeline: PipelineId,
    ) -> Result<(), GitLabApiError> {
        let url =
            self.endpoint(&format!("api/v4/projects/{project}/pipelines/{pipeline}/cancel"))?;
        let response = self
            .http
            .post(url)
            .header(PRIVATE_TOKEN_HEADER, &self.access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
