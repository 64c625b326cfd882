//! Construction of the CI variable set for a triggered run.
//!
//! GitLab caps individual trigger variables around 10 KB, so the webhook
//! payload handed to the pipeline is a *minimized* JSON document: event
//! kind, project identity, author, and the relevant MR/issue identity,
//! state, and title. The full original payload is never forwarded. The raw
//! note text travels in its own variable.

use serde_json::json;

use crate::webhooks::{NoteEvent, NoteTarget};

/// Size ceiling for the minimized webhook-payload variable, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024;

/// Marks the pipeline as assistant-triggered.
pub const VAR_TRIGGER: &str = "CLAUDE_TRIGGER";
pub const VAR_AUTHOR: &str = "CLAUDE_AUTHOR";
pub const VAR_RESOURCE_TYPE: &str = "CLAUDE_RESOURCE_TYPE";
pub const VAR_RESOURCE_ID: &str = "CLAUDE_RESOURCE_ID";
pub const VAR_NOTE: &str = "CLAUDE_NOTE";
pub const VAR_PROJECT_PATH: &str = "CLAUDE_PROJECT_PATH";
pub const VAR_BRANCH: &str = "CLAUDE_BRANCH";
pub const VAR_TRIGGER_PHRASE: &str = "CLAUDE_TRIGGER_PHRASE";
pub const VAR_INSTRUCTION: &str = "CLAUDE_INSTRUCTION";
pub const VAR_PAYLOAD: &str = "CLAUDE_WEBHOOK_PAYLOAD";

/// Builds the ordered variable set for a triggered pipeline.
///
/// Built fresh per trigger and never persisted. Ordering is stable so runs
/// are easy to compare in the CI UI.
pub fn build_variables(
    event: &NoteEvent,
    branch: &str,
    trigger_phrase: &str,
    instruction: &str,
) -> Vec<(String, String)> {
    let (resource_type, resource_id) = match &event.target {
        NoteTarget::MergeRequest { iid, .. } => ("merge_request", iid.0.to_string()),
        NoteTarget::Issue { iid, .. } => ("issue", iid.0.to_string()),
        NoteTarget::Other => ("note", "global".to_string()),
    };

    vec![
        (VAR_TRIGGER.into(), "true".into()),
        (VAR_AUTHOR.into(), event.author.clone()),
        (VAR_RESOURCE_TYPE.into(), resource_type.into()),
        (VAR_RESOURCE_ID.into(), resource_id),
        (VAR_NOTE.into(), event.note.clone()),
        (VAR_PROJECT_PATH.into(), event.project.path_with_namespace.clone()),
        (VAR_BRANCH.into(), branch.to_string()),
        (VAR_TRIGGER_PHRASE.into(), trigger_phrase.to_string()),
        (VAR_INSTRUCTION.into(), instruction.to_string()),
        (VAR_PAYLOAD.into(), minimized_payload(event)),
    ]
}

/// Serializes the minimized webhook payload, guaranteed to stay under
/// [`MAX_PAYLOAD_BYTES`].
///
/// The title is the only field without a natural bound; it is truncated
/// (on char boundaries) until the serialized document fits. Never fails.
pub fn minimized_payload(event: &NoteEvent) -> String {
    let mut title_budget = None;
    loop {
        let payload = render_payload(event, title_budget);
        if payload.len() <= MAX_PAYLOAD_BYTES {
            return payload;
        }
        // Shrink the title by the overshoot and try again; bottoms out at an
        // empty title.
        let current = title_budget.unwrap_or_else(|| title_len(event));
        if current == 0 {
            // Nothing left to shrink; every other field is naturally bounded.
            return payload;
        }
        let overshoot = payload.len() - MAX_PAYLOAD_BYTES;
        title_budget = Some(current.saturating_sub(overshoot.max(1)));
    }
}

fn title_len(event: &NoteEvent) -> usize {
    match &event.target {
        NoteTarget::MergeRequest { title, .. } => title.len(),
        NoteTarget::Issue { title, .. } => title.len(),
        NoteTarget::Other => 0,
    }
}

fn clip(text: &str, budget: Option<usize>) -> &str {
    match budget {
        None => text,
        Some(max) => {
            let mut end = max.min(text.len());
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        }
    }
}

fn render_payload(event: &NoteEvent, title_budget: Option<usize>) -> String {
    let resource = match &event.target {
        NoteTarget::MergeRequest {
            iid,
            source_branch,
            state,
            title,
        } => json!({
            "merge_request": {
                "iid": iid,
                "source_branch": source_branch,
                "state": state,
                "title": clip(title, title_budget),
            }
        }),
        NoteTarget::Issue { iid, title, state } => json!({
            "issue": {
                "iid": iid,
                "title": clip(title, title_budget),
                "state": state,
            }
        }),
        NoteTarget::Other => json!({}),
    };

    let mut payload = json!({
        "event": "note",
        "project": {
            "id": event.project.id,
            "path_with_namespace": event.project.path_with_namespace,
        },
        "author": event.author,
    });
    if let (Some(obj), Some(extra)) = (payload.as_object_mut(), resource.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }

    payload.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueIid, MergeRequestIid, ProjectId};
    use crate::webhooks::ProjectInfo;

    fn issue_event(title: &str, note: &str) -> NoteEvent {
        NoteEvent {
            project: ProjectInfo {
                id: ProjectId(42),
                path_with_namespace: "group/proj".into(),
                default_branch: Some("main".into()),
            },
            author: "u1".into(),
            note: note.into(),
            target: NoteTarget::Issue {
                iid: IssueIid(7),
                title: title.into(),
                state: "opened".into(),
            },
        }
    }

    fn mr_event() -> NoteEvent {
        NoteEvent {
            project: ProjectInfo {
                id: ProjectId(42),
                path_with_namespace: "group/proj".into(),
                default_branch: Some("main".into()),
            },
            author: "u1".into(),
            note: "@claude fix this".into(),
            target: NoteTarget::MergeRequest {
                iid: MergeRequestIid(5),
                source_branch: Some("feature/x".into()),
                state: "opened".into(),
                title: "Add feature X".into(),
            },
        }
    }

    fn get<'a>(vars: &'a [(String, String)], key: &str) -> &'a str {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing variable {key}"))
    }

    #[test]
    fn mr_variables_are_complete_and_ordered() {
        let event = mr_event();
        let vars = build_variables(&event, "feature/x", "@claude", "fix this");

        let keys: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                VAR_TRIGGER,
                VAR_AUTHOR,
                VAR_RESOURCE_TYPE,
                VAR_RESOURCE_ID,
                VAR_NOTE,
                VAR_PROJECT_PATH,
                VAR_BRANCH,
                VAR_TRIGGER_PHRASE,
                VAR_INSTRUCTION,
                VAR_PAYLOAD,
            ]
        );

        assert_eq!(get(&vars, VAR_TRIGGER), "true");
        assert_eq!(get(&vars, VAR_AUTHOR), "u1");
        assert_eq!(get(&vars, VAR_RESOURCE_TYPE), "merge_request");
        assert_eq!(get(&vars, VAR_RESOURCE_ID), "5");
        assert_eq!(get(&vars, VAR_NOTE), "@claude fix this");
        assert_eq!(get(&vars, VAR_PROJECT_PATH), "group/proj");
        assert_eq!(get(&vars, VAR_BRANCH), "feature/x");
        assert_eq!(get(&vars, VAR_TRIGGER_PHRASE), "@claude");
        assert_eq!(get(&vars, VAR_INSTRUCTION), "fix this");
    }

    #[test]
    fn issue_variables_use_issue_resource() {
        let event = issue_event("Fix Bug", "@claude go");
        let vars = build_variables(&event, "claude/issue-7-fix-bug-123", "@claude", "go");

        assert_eq!(get(&vars, VAR_RESOURCE_TYPE), "issue");
        assert_eq!(get(&vars, VAR_RESOURCE_ID), "7");
        assert_eq!(get(&vars, VAR_BRANCH), "claude/issue-7-fix-bug-123");
    }

    #[test]
    fn minimized_payload_contains_only_needed_fields() {
        let payload = minimized_payload(&mr_event());
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(json["event"], "note");
        assert_eq!(json["project"]["id"], 42);
        assert_eq!(json["project"]["path_with_namespace"], "group/proj");
        assert_eq!(json["author"], "u1");
        assert_eq!(json["merge_request"]["iid"], 5);
        assert_eq!(json["merge_request"]["source_branch"], "feature/x");
        assert_eq!(json["merge_request"]["state"], "opened");
        assert_eq!(json["merge_request"]["title"], "Add feature X");

        // The note body must not be part of the payload variable.
        assert!(json.get("note").is_none());
        assert!(json.get("object_attributes").is_none());
    }

    #[test]
    fn huge_note_does_not_inflate_payload() {
        let event = issue_event("Fix Bug", &"x".repeat(100 * 1024));
        let payload = minimized_payload(&event);
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);

        // The note still travels in its own variable, unclipped.
        let vars = build_variables(&event, "b", "@claude", "");
        assert_eq!(get(&vars, VAR_NOTE).len(), 100 * 1024);
    }

    #[test]
    fn huge_title_is_truncated_to_fit() {
        let event = issue_event(&"t".repeat(64 * 1024), "@claude go");
        let payload = minimized_payload(&event);
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);

        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let title = json["issue"]["title"].as_str().unwrap();
        assert!(!title.is_empty());
        assert!(title.len() < 64 * 1024);
    }

    #[test]
    fn huge_multibyte_title_is_truncated_on_char_boundaries() {
        let event = issue_event(&"é".repeat(32 * 1024), "@claude go");
        let payload = minimized_payload(&event);
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);
        // Parsing proves no char was split.
        let _: serde_json::Value = serde_json::from_str(&payload).unwrap();
    }
}
