//! Starting pipelines and cancelling superseded ones.
//!
//! The trigger call is a single synchronous request; failures abort the
//! calling flow. Supersession is the opposite: listing and cancelling stale
//! pending pipelines for the same ref is best-effort fan-out, and nothing on
//! that path may fail the overall trigger operation.

use futures::future::join_all;
use tracing::{info, warn};

use crate::gitlab::{GitLabApi, GitLabApiError};
use crate::types::{PipelineId, ProjectId};

/// Triggers a pipeline for `git_ref` and returns its ID.
pub async fn start_pipeline(
    api: &dyn GitLabApi,
    project: ProjectId,
    git_ref: &str,
    variables: &[(String, String)],
) -> Result<PipelineId, GitLabApiError> {
    let pipeline = api.trigger_pipeline(project, git_ref, variables).await?;
    info!(%project, %pipeline, git_ref, "triggered pipeline");
    Ok(pipeline)
}

/// Cancels pending pipelines for `git_ref` other than `keep`.
///
/// Cancellations run concurrently; each failure is logged and isolated.
/// Never returns an error and never affects the trigger outcome.
pub async fn cancel_superseded(
    api: &dyn GitLabApi,
    project: ProjectId,
    keep: PipelineId,
    git_ref: &str,
) {
    let pending = match api.list_pending_pipelines(project, git_ref).await {
        Ok(pending) => pending,
        Err(error) => {
            warn!(%error, %project, git_ref, "could not list pending pipelines for supersession");
            return;
        }
    };

    let cancellations = pending
        .into_iter()
        .filter(|p| p.id != keep)
        .map(|superseded| async move {
            match api.cancel_pipeline(project, superseded.id).await {
                Ok(()) => {
                    info!(%project, pipeline = %superseded.id, kept = %keep, "cancelled superseded pipeline");
                }
                Err(error) => {
                    warn!(%error, %project, pipeline = %superseded.id, "failed to cancel superseded pipeline");
                }
            }
        });

    join_all(cancellations).await;
}
