//! The webhook orchestrator: a linear stage machine from inbound event to
//! terminal outcome.
//!
//! ```text
//! AUTH → FILTER_EVENT_KIND → DETECT_TRIGGER → (enabled?) → RATE_LIMIT
//!      → RESOLVE_BRANCH → BUILD_VARIABLES → TRIGGER_PIPELINE
//!      → (best-effort) CANCEL_SUPERSEDED → (fire-and-forget) NOTIFY → DONE
//! ```
//!
//! No loops, no retries, no cross-request state beyond what the counter
//! store holds. Every stage can short-circuit to a terminal [`Outcome`];
//! the transport layer maps outcomes to HTTP statuses.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::branch::BranchResolver;
use crate::config::AppConfig;
use crate::gitlab::GitLabApi;
use crate::notify::{self, NotifyDetails, Notifier};
use crate::pipeline;
use crate::ratelimit::{rate_limit_key, RateLimiter};
use crate::trigger::detect;
use crate::types::PipelineId;
use crate::webhooks::{self, EventParseError, NoteEvent, NoteTarget};

/// The terminal result of processing one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A pipeline was started.
    Started { pipeline: PipelineId, branch: String },

    /// The event is not for us (wrong kind, no trigger phrase, untriggerable
    /// target, malformed body). Treated as success; no side effects.
    Ignored { reason: &'static str },

    /// The bot is globally disabled.
    Disabled,

    /// Shared-secret mismatch.
    Unauthorized,

    /// The admission window for this (user, resource) is exhausted.
    RateLimited,

    /// A stage failed; the cause is logged server-side and never leaked to
    /// the caller beyond a generic message.
    Error,
}

/// Coordinates one webhook delivery through the stage machine.
///
/// Holds only service-scoped collaborators, all explicitly constructed and
/// passed in; nothing here is a process-global.
pub struct Orchestrator {
    config: AppConfig,
    api: Arc<dyn GitLabApi>,
    limiter: RateLimiter,
    branches: BranchResolver,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        api: Arc<dyn GitLabApi>,
        limiter: RateLimiter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Orchestrator {
            config,
            api,
            limiter,
            branches: BranchResolver::new(),
            notifier,
        }
    }

    /// Processes one delivery: header token, header event kind, raw body.
    ///
    /// Runs to a terminal outcome for every accepted request; there is no
    /// mid-flow cancellation (webhooks are fire-and-forget on GitLab's
    /// side).
    pub async fn handle(
        &self,
        token: Option<&str>,
        event_kind: Option<&str>,
        body: &[u8],
    ) -> Outcome {
        // AUTH. Nothing is parsed or touched before the secret checks out.
        let authorized = token
            .map(|t| webhooks::verify_token(t, &self.config.webhook_secret))
            .unwrap_or(false);
        if !authorized {
            warn!("webhook rejected: token mismatch");
            return Outcome::Unauthorized;
        }

        // FILTER_EVENT_KIND.
        match event_kind {
            Some(webhooks::NOTE_HOOK) => {}
            other => {
                debug!(event_kind = other.unwrap_or("<none>"), "ignoring event kind");
                return Outcome::Ignored {
                    reason: "unsupported event kind",
                };
            }
        }

        let event = match NoteEvent::parse(body) {
            Ok(event) => event,
            Err(EventParseError::UnexpectedKind(kind)) => {
                debug!(object_kind = %kind, "ignoring non-note payload");
                return Outcome::Ignored {
                    reason: "unsupported event kind",
                };
            }
            Err(error) => {
                // Responding 200 keeps GitLab from disabling the hook over
                // payloads we can't read; the fault still gets logged.
                warn!(%error, "ignoring malformed note payload");
                return Outcome::Ignored {
                    reason: "malformed payload",
                };
            }
        };

        if matches!(event.target, NoteTarget::Other) {
            return Outcome::Ignored {
                reason: "comment target cannot trigger a run",
            };
        }

        // DETECT_TRIGGER.
        let matched = detect(&event.note, &self.config.trigger_phrase);
        if !matched.matched {
            return Outcome::Ignored {
                reason: "no trigger phrase",
            };
        }

        if !self.config.bot_enabled {
            info!(author = %event.author, "trigger matched but bot is disabled");
            return Outcome::Disabled;
        }

        // RATE_LIMIT. A disabled bot never reaches here, so admissions are
        // only consumed by requests that could actually start a pipeline.
        let key = rate_limit_key(&event.author, event.project.id, &event.resource_id());
        if !self.limiter.try_admit(&key, Utc::now()).await {
            info!(key, "request rate limited");
            self.notify_rate_limited(&event);
            return Outcome::RateLimited;
        }

        // RESOLVE_BRANCH.
        let branch = match self.branches.resolve(self.api.as_ref(), &event).await {
            Ok(branch) => branch,
            Err(cause) => {
                error!(%cause, project = %event.project.id, "branch resolution failed");
                return Outcome::Error;
            }
        };

        // BUILD_VARIABLES + TRIGGER_PIPELINE.
        let variables = pipeline::build_variables(
            &event,
            &branch,
            &self.config.trigger_phrase,
            &matched.instruction,
        );
        let pipeline_id =
            match pipeline::start_pipeline(self.api.as_ref(), event.project.id, &branch, &variables)
                .await
            {
                Ok(id) => id,
                Err(cause) => {
                    // A branch created above is left in place: creation is
                    // idempotent by construction (timestamp suffix) and the
                    // next trigger gets a fresh one.
                    error!(%cause, project = %event.project.id, %branch, "pipeline trigger failed");
                    return Outcome::Error;
                }
            };

        // CANCEL_SUPERSEDED: opt-in, best-effort, cannot change the outcome.
        if self.config.cancel_superseded {
            pipeline::cancel_superseded(self.api.as_ref(), event.project.id, pipeline_id, &branch)
                .await;
        }

        // NOTIFY: detached; the response does not wait.
        self.notify_started(&event, &branch, pipeline_id);

        Outcome::Started {
            pipeline: pipeline_id,
            branch,
        }
    }

    fn notify_started(&self, event: &NoteEvent, branch: &str, pipeline: PipelineId) {
        let notifier = Arc::clone(&self.notifier);
        let details = NotifyDetails {
            project_path: event.project.path_with_namespace.clone(),
            author: event.author.clone(),
            resource: resource_label(&event.target),
            branch: Some(branch.to_string()),
            pipeline: Some(pipeline),
        };
        notify::dispatch(async move { notifier.notify_pipeline_started(&details).await });
    }

    fn notify_rate_limited(&self, event: &NoteEvent) {
        let notifier = Arc::clone(&self.notifier);
        let details = NotifyDetails {
            project_path: event.project.path_with_namespace.clone(),
            author: event.author.clone(),
            resource: resource_label(&event.target),
            branch: None,
            pipeline: None,
        };
        notify::dispatch(async move { notifier.notify_rate_limited(&details).await });
    }
}

fn resource_label(target: &NoteTarget) -> String {
    match target {
        NoteTarget::MergeRequest { iid, .. } => iid.to_string(),
        NoteTarget::Issue { iid, .. } => iid.to_string(),
        NoteTarget::Other => "note".to_string(),
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::{GitLabApiError, PipelineRecord, ProjectDetails};
    use crate::notify::NotifyError;
    use crate::ratelimit::{InMemoryCounterStore, RateLimiter};
    use crate::types::ProjectId;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// A fake GitLab recording every call.
    #[derive(Default)]
    struct FakeApi {
        branches: Mutex<Vec<(String, String)>>,
        triggers: Mutex<Vec<(String, Vec<(String, String)>)>>,
        cancelled: Mutex<Vec<PipelineId>>,
        pending: Vec<PipelineRecord>,
        fail_trigger: bool,
        fail_create: bool,
    }

    #[async_trait]
    impl GitLabApi for FakeApi {
        async fn show_project(&self, _: ProjectId) -> Result<ProjectDetails, GitLabApiError> {
            Ok(ProjectDetails {
                path_with_namespace: "group/proj".into(),
                default_branch: Some("main".into()),
            })
        }

        async fn create_branch(
            &self,
            _: ProjectId,
            branch: &str,
            base: &str,
        ) -> Result<(), GitLabApiError> {
            if self.fail_create {
                return Err(GitLabApiError::from_response(
                    400,
                    r#"{"message": "branch exists"}"#,
                ));
            }
            self.branches
                .lock()
                .unwrap()
                .push((branch.into(), base.into()));
            Ok(())
        }

        async fn trigger_pipeline(
            &self,
            _: ProjectId,
            git_ref: &str,
            variables: &[(String, String)],
        ) -> Result<PipelineId, GitLabApiError> {
            if self.fail_trigger {
                return Err(GitLabApiError::from_response(
                    403,
                    r#"{"message": "403 Forbidden"}"#,
                ));
            }
            self.triggers
                .lock()
                .unwrap()
                .push((git_ref.into(), variables.to_vec()));
            Ok(PipelineId(1234))
        }

        async fn list_pending_pipelines(
            &self,
            _: ProjectId,
            _: &str,
        ) -> Result<Vec<PipelineRecord>, GitLabApiError> {
            Ok(self.pending.clone())
        }

        async fn cancel_pipeline(
            &self,
            _: ProjectId,
            pipeline: PipelineId,
        ) -> Result<(), GitLabApiError> {
            self.cancelled.lock().unwrap().push(pipeline);
            Ok(())
        }
    }

    /// Counts notification calls.
    #[derive(Default)]
    struct CountingNotifier {
        started: AtomicUsize,
        rate_limited: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify_pipeline_started(&self, _: &NotifyDetails) -> Result<(), NotifyError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn notify_rate_limited(&self, _: &NotifyDetails) -> Result<(), NotifyError> {
            self.rate_limited.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> AppConfig {
        AppConfig::from_lookup(|name| {
            match name {
                "WEBHOOK_SECRET" => Some("s3cret"),
                "GITLAB_TOKEN" => Some("glpat"),
                "PIPELINE_TRIGGER_TOKEN" => Some("trig"),
                _ => None,
            }
            .map(str::to_string)
        })
        .unwrap()
    }

    struct Harness {
        orchestrator: Orchestrator,
        api: Arc<FakeApi>,
        notifier: Arc<CountingNotifier>,
    }

    fn harness_with(mut cfg: AppConfig, api: FakeApi) -> Harness {
        cfg.listen_addr = "127.0.0.1:0".parse().unwrap();
        let api = Arc::new(api);
        let notifier = Arc::new(CountingNotifier::default());
        let limiter = RateLimiter::new(Arc::new(InMemoryCounterStore::new()), cfg.rate_limit);
        let orchestrator = Orchestrator::new(
            cfg,
            Arc::clone(&api) as Arc<dyn GitLabApi>,
            limiter,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        Harness {
            orchestrator,
            api,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(config(), FakeApi::default())
    }

    fn issue_body(note: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": {
                "id": 42,
                "path_with_namespace": "group/proj",
                "default_branch": "main"
            },
            "object_attributes": { "note": note, "noteable_type": "Issue" },
            "issue": { "iid": 7, "title": "Fix Bug!! In Parser", "state": "opened" }
        }))
        .unwrap()
    }

    fn mr_body(note: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": {
                "id": 42,
                "path_with_namespace": "group/proj",
                "default_branch": "main"
            },
            "object_attributes": { "note": note, "noteable_type": "MergeRequest" },
            "merge_request": {
                "iid": 5,
                "source_branch": "feature/x",
                "state": "opened",
                "title": "Add X"
            }
        }))
        .unwrap()
    }

    async fn run(h: &Harness, token: &str, kind: &str, body: &[u8]) -> Outcome {
        h.orchestrator.handle(Some(token), Some(kind), body).await
    }

    /// Lets detached notification tasks run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn issue_trigger_starts_pipeline_on_fresh_branch() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix this")).await;

        match outcome {
            Outcome::Started { pipeline, branch } => {
                assert_eq!(pipeline, PipelineId(1234));
                assert!(branch.starts_with("claude/issue-7-fix-bug-in-parser-"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let branches = h.api.branches.lock().unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].1, "main");

        let triggers = h.api.triggers.lock().unwrap();
        assert_eq!(triggers.len(), 1);
        let vars = &triggers[0].1;
        assert!(vars.iter().any(|(k, v)| k == "CLAUDE_INSTRUCTION" && v == "fix this"));
        assert!(vars.iter().any(|(k, v)| k == "CLAUDE_RESOURCE_TYPE" && v == "issue"));

        settle().await;
        assert_eq!(h.notifier.started.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.rate_limited.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mr_trigger_uses_source_branch_without_creating_one() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Note Hook", &mr_body("@claude fix this")).await;

        assert_eq!(
            outcome,
            Outcome::Started {
                pipeline: PipelineId(1234),
                branch: "feature/x".into()
            }
        );
        assert!(h.api.branches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized_with_no_side_effects() {
        let h = harness();
        let outcome = run(&h, "wrong", "Note Hook", &issue_body("@claude fix")).await;

        assert_eq!(outcome, Outcome::Unauthorized);
        assert!(h.api.branches.lock().unwrap().is_empty());
        assert!(h.api.triggers.lock().unwrap().is_empty());

        // No admission consumed: three more correct requests all start.
        for _ in 0..3 {
            let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await;
            assert!(matches!(outcome, Outcome::Started { .. }));
        }
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let h = harness();
        let outcome = h
            .orchestrator
            .handle(None, Some("Note Hook"), &issue_body("@claude fix"))
            .await;
        assert_eq!(outcome, Outcome::Unauthorized);
    }

    #[tokio::test]
    async fn push_hook_is_ignored() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Push Hook", &issue_body("@claude fix")).await;

        assert!(matches!(outcome, Outcome::Ignored { .. }));
        assert!(h.api.triggers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn note_without_trigger_phrase_is_ignored() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Note Hook", &issue_body("just a comment")).await;
        assert_eq!(outcome, Outcome::Ignored { reason: "no trigger phrase" });
    }

    #[tokio::test]
    async fn adjacent_mention_is_ignored() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude-bot fix")).await;
        assert!(matches!(outcome, Outcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_ignored() {
        let h = harness();
        let outcome = run(&h, "s3cret", "Note Hook", b"{not json").await;
        assert_eq!(outcome, Outcome::Ignored { reason: "malformed payload" });
    }

    #[tokio::test]
    async fn disabled_bot_short_circuits_before_rate_limiting() {
        let mut cfg = config();
        cfg.bot_enabled = false;
        let h = harness_with(cfg, FakeApi::default());

        for _ in 0..10 {
            let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await;
            assert_eq!(outcome, Outcome::Disabled);
        }
        assert!(h.api.triggers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fourth_request_in_window_is_rate_limited() {
        let h = harness();

        for _ in 0..3 {
            let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await;
            assert!(matches!(outcome, Outcome::Started { .. }));
        }

        let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await;
        assert_eq!(outcome, Outcome::RateLimited);

        // Exactly three pipelines ran; the rejection was notified.
        assert_eq!(h.api.triggers.lock().unwrap().len(), 3);
        settle().await;
        assert_eq!(h.notifier.rate_limited.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_users_have_independent_budgets() {
        let h = harness();

        for _ in 0..3 {
            assert!(matches!(
                run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await,
                Outcome::Started { .. }
            ));
        }
        assert_eq!(
            run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await,
            Outcome::RateLimited
        );

        let mut other_user = serde_json::from_slice::<serde_json::Value>(&issue_body("@claude fix")).unwrap();
        other_user["user"]["username"] = json!("u2");
        let body = serde_json::to_vec(&other_user).unwrap();
        assert!(matches!(
            run(&h, "s3cret", "Note Hook", &body).await,
            Outcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn branch_creation_failure_is_an_error() {
        let h = harness_with(
            config(),
            FakeApi {
                fail_create: true,
                ..FakeApi::default()
            },
        );

        let outcome = run(&h, "s3cret", "Note Hook", &issue_body("@claude fix")).await;
        assert_eq!(outcome, Outcome::Error);
        assert!(h.api.triggers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trigger_failure_is_an_error() {
        let h = harness_with(
            config(),
            FakeApi {
                fail_trigger: true,
                ..FakeApi::default()
            },
        );

        let outcome = run(&h, "s3cret", "Note Hook", &mr_body("@claude fix")).await;
        assert_eq!(outcome, Outcome::Error);
        settle().await;
        assert_eq!(h.notifier.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn supersession_cancels_stale_pipelines_when_enabled() {
        let mut cfg = config();
        cfg.cancel_superseded = true;
        let h = harness_with(
            cfg,
            FakeApi {
                pending: vec![
                    PipelineRecord {
                        id: PipelineId(10),
                        git_ref: "feature/x".into(),
                        status: "pending".into(),
                    },
                    PipelineRecord {
                        id: PipelineId(1234),
                        git_ref: "feature/x".into(),
                        status: "pending".into(),
                    },
                ],
                ..FakeApi::default()
            },
        );

        let outcome = run(&h, "s3cret", "Note Hook", &mr_body("@claude fix")).await;
        assert!(matches!(outcome, Outcome::Started { .. }));

        // The freshly started pipeline is kept, the stale one cancelled.
        assert_eq!(*h.api.cancelled.lock().unwrap(), vec![PipelineId(10)]);
    }

    #[tokio::test]
    async fn supersession_is_off_by_default() {
        let h = harness_with(
            config(),
            FakeApi {
                pending: vec![PipelineRecord {
                    id: PipelineId(10),
                    git_ref: "feature/x".into(),
                    status: "pending".into(),
                }],
                ..FakeApi::default()
            },
        );

        let outcome = run(&h, "s3cret", "Note Hook", &mr_body("@claude fix")).await;
        assert!(matches!(outcome, Outcome::Started { .. }));
        assert!(h.api.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_note_is_ignored() {
        let h = harness();
        let body = serde_json::to_vec(&json!({
            "object_kind": "note",
            "user": { "username": "u1" },
            "project": { "id": 42, "path_with_namespace": "group/proj" },
            "object_attributes": { "note": "@claude fix", "noteable_type": "Commit" }
        }))
        .unwrap();

        let outcome = run(&h, "s3cret", "Note Hook", &body).await;
        assert!(matches!(outcome, Outcome::Ignored { .. }));
    }
}
