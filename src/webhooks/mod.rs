//! GitLab webhook event model and request authentication.
//!
//! GitLab delivers webhooks as JSON bodies accompanied by two headers: an
//! event kind (`X-Gitlab-Event`) and a shared-secret token (`X-Gitlab-Token`).
//! This module provides the typed note-event model and the constant-time
//! secret comparison. Transport concerns (header extraction, status codes)
//! live in the `server` module.

pub mod auth;
pub mod events;

pub use auth::verify_token;
pub use events::{EventParseError, NoteEvent, NoteTarget, ProjectInfo};

/// The `X-Gitlab-Event` value for comment events.
pub const NOTE_HOOK: &str = "Note Hook";
