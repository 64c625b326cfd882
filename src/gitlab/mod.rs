//! The GitLab Project/Pipeline collaborator.
//!
//! The core treats GitLab as an opaque capability behind [`GitLabApi`]: show
//! a project, create a branch, trigger a pipeline, list and cancel pending
//! pipelines. [`GitLabClient`] is the REST implementation against the v4
//! API; tests substitute in-memory fakes.

pub mod api;
pub mod client;
pub mod error;

pub use api::{GitLabApi, PipelineRecord, ProjectDetails};
pub use client::GitLabClient;
pub use error::GitLabApiError;
