//! Typed model for GitLab "Note Hook" webhook payloads.
//!
//! GitLab note events cover comments on merge requests, issues, commits, and
//! snippets. The payload is large and mostly irrelevant to the bot; this
//! module deserializes only the fields the orchestrator needs and tags the
//! comment target explicitly rather than threading an open-ended JSON value
//! through the rest of the code.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{IssueIid, MergeRequestIid, ProjectId};

/// Errors that can occur while parsing a note-event payload.
#[derive(Debug, Error)]
pub enum EventParseError {
    /// The body was not valid JSON or was missing required fields.
    #[error("invalid note payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body's `object_kind` was not `note`.
    #[error("unexpected object_kind: {0}")]
    UnexpectedKind(String),
}

/// The project a note event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectInfo {
    /// The numeric project ID.
    pub id: ProjectId,

    /// The full path, e.g. `group/project`.
    pub path_with_namespace: String,

    /// The default branch. GitLab includes this in webhook payloads, but it
    /// can be absent for freshly created projects.
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// What the comment was left on.
///
/// Only merge-request and issue comments can trigger a run; commit and
/// snippet comments are carried as [`NoteTarget::Other`] so the orchestrator
/// can ignore them without a parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteTarget {
    /// A comment on a merge request.
    MergeRequest {
        iid: MergeRequestIid,
        /// The MR's source branch. Absent in malformed payloads; resolution
        /// fails later if it is needed and missing.
        source_branch: Option<String>,
        state: String,
        title: String,
    },

    /// A comment on an issue.
    Issue {
        iid: IssueIid,
        title: String,
        state: String,
    },

    /// A comment on something else (commit, snippet).
    Other,
}

/// An inbound note event, constructed once per request from the wire payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEvent {
    /// The project the comment was made in.
    pub project: ProjectInfo,

    /// Username of the comment author.
    pub author: String,

    /// The raw comment text.
    pub note: String,

    /// The resource the comment targets.
    pub target: NoteTarget,
}

impl NoteEvent {
    /// Parses a note event from raw webhook body bytes.
    ///
    /// Returns [`EventParseError::UnexpectedKind`] if the body is valid JSON
    /// but not a note event (callers treat this the same as a filtered event
    /// kind, not as a hard failure).
    pub fn parse(body: &[u8]) -> Result<Self, EventParseError> {
        let wire: WirePayload = serde_json::from_slice(body)?;

        if wire.object_kind != "note" {
            return Err(EventParseError::UnexpectedKind(wire.object_kind));
        }

        // The noteable_type attribute is authoritative for what the comment
        // targets; the merge_request/issue objects are only attached for the
        // matching type.
        let target = match wire.object_attributes.noteable_type.as_str() {
            "MergeRequest" => match wire.merge_request {
                Some(mr) => NoteTarget::MergeRequest {
                    iid: mr.iid,
                    source_branch: mr.source_branch.filter(|b| !b.is_empty()),
                    state: mr.state,
                    title: mr.title,
                },
                None => NoteTarget::Other,
            },
            "Issue" => match wire.issue {
                Some(issue) => NoteTarget::Issue {
                    iid: issue.iid,
                    title: issue.title,
                    state: issue.state,
                },
                None => NoteTarget::Other,
            },
            _ => NoteTarget::Other,
        };

        Ok(NoteEvent {
            project: wire.project,
            author: wire.user.username,
            note: wire.object_attributes.note,
            target,
        })
    }

    /// The rate-limit resource ID for this event: MR iid, issue iid, or a
    /// constant fallback for target kinds without a per-resource identity.
    pub fn resource_id(&self) -> String {
        match &self.target {
            NoteTarget::MergeRequest { iid, .. } => iid.0.to_string(),
            NoteTarget::Issue { iid, .. } => iid.0.to_string(),
            NoteTarget::Other => "global".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    object_kind: String,
    user: WireUser,
    project: ProjectInfo,
    object_attributes: WireNoteAttributes,
    #[serde(default)]
    merge_request: Option<WireMergeRequest>,
    #[serde(default)]
    issue: Option<WireIssue>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct WireNoteAttributes {
    note: String,
    noteable_type: String,
}

#[derive(Debug, Deserialize)]
struct WireMergeRequest {
    iid: MergeRequestIid,
    #[serde(default)]
    source_branch: Option<String>,
    state: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    iid: IssueIid,
    #[serde(default)]
    title: String,
    state: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mr_payload() -> serde_json::Value {
        json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": {
                "id": 42,
                "path_with_namespace": "group/proj",
                "default_branch": "main"
            },
            "object_attributes": {
                "note": "@claude fix this",
                "noteable_type": "MergeRequest"
            },
            "merge_request": {
                "iid": 5,
                "source_branch": "feature/x",
                "state": "opened",
                "title": "Add feature X"
            }
        })
    }

    #[test]
    fn parses_merge_request_note() {
        let body = serde_json::to_vec(&mr_payload()).unwrap();
        let event = NoteEvent::parse(&body).unwrap();

        assert_eq!(event.author, "u1");
        assert_eq!(event.note, "@claude fix this");
        assert_eq!(event.project.id, ProjectId(42));
        assert_eq!(event.project.default_branch.as_deref(), Some("main"));
        assert_eq!(
            event.target,
            NoteTarget::MergeRequest {
                iid: MergeRequestIid(5),
                source_branch: Some("feature/x".to_string()),
                state: "opened".to_string(),
                title: "Add feature X".to_string(),
            }
        );
        assert_eq!(event.resource_id(), "5");
    }

    #[test]
    fn parses_issue_note() {
        let body = serde_json::to_vec(&json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": { "id": 42, "path_with_namespace": "group/proj" },
            "object_attributes": {
                "note": "@claude do it",
                "noteable_type": "Issue"
            },
            "issue": { "iid": 7, "title": "Fix Bug!! In Parser", "state": "opened" }
        }))
        .unwrap();

        let event = NoteEvent::parse(&body).unwrap();
        assert_eq!(
            event.target,
            NoteTarget::Issue {
                iid: IssueIid(7),
                title: "Fix Bug!! In Parser".to_string(),
                state: "opened".to_string(),
            }
        );
        assert_eq!(event.resource_id(), "7");
        assert_eq!(event.project.default_branch, None);
    }

    #[test]
    fn commit_note_is_other() {
        let body = serde_json::to_vec(&json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": { "id": 42, "path_with_namespace": "group/proj" },
            "object_attributes": {
                "note": "nice commit",
                "noteable_type": "Commit"
            }
        }))
        .unwrap();

        let event = NoteEvent::parse(&body).unwrap();
        assert_eq!(event.target, NoteTarget::Other);
        assert_eq!(event.resource_id(), "global");
    }

    #[test]
    fn missing_source_branch_is_none() {
        let mut payload = mr_payload();
        payload["merge_request"]
            .as_object_mut()
            .unwrap()
            .remove("source_branch");
        let body = serde_json::to_vec(&payload).unwrap();

        let event = NoteEvent::parse(&body).unwrap();
        match event.target {
            NoteTarget::MergeRequest { source_branch, .. } => {
                assert_eq!(source_branch, None);
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn empty_source_branch_is_none() {
        let mut payload = mr_payload();
        payload["merge_request"]["source_branch"] = json!("");
        let body = serde_json::to_vec(&payload).unwrap();

        let event = NoteEvent::parse(&body).unwrap();
        match event.target {
            NoteTarget::MergeRequest { source_branch, .. } => {
                assert_eq!(source_branch, None);
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn wrong_object_kind_is_rejected() {
        let body = serde_json::to_vec(&json!({
            "object_kind": "push",
            "user": { "username": "u1" },
            "project": { "id": 42, "path_with_namespace": "group/proj" },
            "object_attributes": { "note": "", "noteable_type": "Commit" }
        }))
        .unwrap();

        match NoteEvent::parse(&body) {
            Err(EventParseError::UnexpectedKind(kind)) => assert_eq!(kind, "push"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            NoteEvent::parse(b"not json"),
            Err(EventParseError::InvalidJson(_))
        ));
    }
}
