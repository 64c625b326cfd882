//! Branch resolution for triggered runs.
//!
//! Merge-request comments run against the MR's source branch. Issue comments
//! get a fresh branch every time, cut from the project default branch and
//! named `claude/issue-{iid}-{slug}-{timestamp}`. The timestamp is
//! milliseconds since the epoch, issued strictly increasing process-wide so
//! two triggers for the same issue in the same millisecond still produce
//! distinct names. Collisions across processes remain possible in theory;
//! branch creation would then fail and the error propagates.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::gitlab::{GitLabApi, GitLabApiError};
use crate::types::IssueIid;
use crate::webhooks::{NoteEvent, NoteTarget};

/// Branch names use this prefix for issue-origin runs.
const BRANCH_PREFIX: &str = "claude/issue";

/// Maximum length of the sanitized title slug (not the whole branch name).
const MAX_SLUG_LEN: usize = 50;

/// Errors during branch resolution.
#[derive(Debug, Error)]
pub enum BranchError {
    /// An MR-origin event without a source branch cannot be run.
    #[error("merge request event has no source branch")]
    MissingSourceBranch,

    /// Neither the event nor the project API yielded a default branch to
    /// base the new issue branch on.
    #[error("project has no default branch to base the new branch on")]
    NoDefaultBranch,

    /// The comment targets neither a merge request nor an issue.
    #[error("note target has no branch to run against")]
    NoTarget,

    /// The GitLab API rejected a lookup or the branch creation.
    #[error(transparent)]
    Api(#[from] GitLabApiError),
}

/// Resolves the git ref a pipeline should run against, creating issue
/// branches on demand.
///
/// Holds the monotonic timestamp state; construct one per service and share
/// it, rather than relying on implicit globals.
#[derive(Debug, Default)]
pub struct BranchResolver {
    last_issued_millis: AtomicI64,
}

impl BranchResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the ref for `event`.
    ///
    /// - MR target: the source branch, or [`BranchError::MissingSourceBranch`].
    /// - Issue target: creates a new branch from the default branch (fetched
    ///   via [`GitLabApi::show_project`] when the payload omits it) and
    ///   returns its name. Creation failures propagate; no retry here.
    pub async fn resolve(
        &self,
        api: &dyn GitLabApi,
        event: &NoteEvent,
    ) -> Result<String, BranchError> {
        match &event.target {
            NoteTarget::MergeRequest { source_branch, .. } => source_branch
                .clone()
                .ok_or(BranchError::MissingSourceBranch),

            NoteTarget::Issue { iid, title, .. } => {
                let base = match &event.project.default_branch {
                    Some(branch) if !branch.is_empty() => branch.clone(),
                    _ => api
                        .show_project(event.project.id)
                        .await?
                        .default_branch
                        .filter(|b| !b.is_empty())
                        .ok_or(BranchError::NoDefaultBranch)?,
                };

                let branch = self.issue_branch_name(*iid, title);
                api.create_branch(event.project.id, &branch, &base).await?;
                info!(
                    project = %event.project.id,
                    issue = %iid,
                    %branch,
                    base = %base,
                    "created branch for issue-triggered run"
                );
                Ok(branch)
            }

            NoteTarget::Other => Err(BranchError::NoTarget),
        }
    }

    /// Builds `claude/issue-{iid}-{slug}-{timestamp}`.
    fn issue_branch_name(&self, iid: IssueIid, title: &str) -> String {
        format!(
            "{BRANCH_PREFIX}-{}-{}-{}",
            iid.0,
            sanitize_title(title),
            self.next_timestamp_millis()
        )
    }

    /// Issues a millisecond timestamp that is strictly greater than every
    /// previously issued one, clamped up from the wall clock.
    fn next_timestamp_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_issued_millis.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_issued_millis.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Sanitizes an issue title into a branch-safe slug: lowercase, every run of
/// non-`[a-z0-9]` collapsed to a single dash, dashes trimmed, truncated to
/// 50 characters. A title with no usable characters yields an empty slug;
/// the surrounding branch name stays well-formed.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
