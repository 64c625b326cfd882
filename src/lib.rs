//! Pipeline Bot - a GitLab webhook service that starts assistant CI
//! pipelines from comment mentions.
//!
//! A comment containing the trigger phrase (default `@claude`) on a merge
//! request or issue is authenticated, rate limited, resolved to a git ref
//! (the MR source branch, or a freshly created issue branch), and turned
//! into a pipeline trigger carrying the comment context as CI variables.

pub mod branch;
pub mod config;
pub mod gitlab;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod ratelimit;
pub mod server;
pub mod trigger;
pub mod types;
pub mod webhooks;
