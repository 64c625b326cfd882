//! The trait surface the core consumes from GitLab.

use async_trait::async_trait;
use serde::Deserialize;

use super::error::GitLabApiError;
use crate::types::{PipelineId, ProjectId};

/// Project metadata the bot needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectDetails {
    /// Full path, e.g. `group/project`.
    pub path_with_namespace: String,

    /// The default branch; `None` for empty repositories.
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// A pipeline as returned by the list endpoint. Read-only to this core; used
/// only for supersession comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineRecord {
    pub id: PipelineId,

    #[serde(rename = "ref")]
    pub git_ref: String,

    pub status: String,
}

/// The Project/Pipeline capability consumed by the orchestrator.
///
/// Implementations must apply their own request timeouts; callers never
/// retry at this layer.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Fetches project metadata (used to learn the default branch when the
    /// webhook payload omits it).
    async fn show_project(&self, project: ProjectId) -> Result<ProjectDetails, GitLabApiError>;

    /// Creates `branch` in `project` starting from `base_ref`.
    async fn create_branch(
        &self,
        project: ProjectId,
        branch: &str,
        base_ref: &str,
    ) -> Result<(), GitLabApiError>;

    /// Triggers a pipeline for `git_ref` with the given variables, returning
    /// the new pipeline's ID.
    async fn trigger_pipeline(
        &self,
        project: ProjectId,
        git_ref: &str,
        variables: &[(String, String)],
    ) -> Result<PipelineId, GitLabApiError>;

    /// Lists pipelines for `git_ref` that are still pending.
    async fn list_pending_pipelines(
        &self,
        project: ProjectId,
        git_ref: &str,
    ) -> Result<Vec<PipelineRecord>, GitLabApiError>;

    /// Cancels a single pipeline.
    async fn cancel_pipeline(
        &self,
        project: ProjectId,
        pipeline: PipelineId,
    ) -> Result<(), GitLabApiError>;
}
