//! Inbound repository events and their classification.
//!
//! Webhook payloads are decoded into a closed [`Event`] sum type. Every kind
//! the pipeline does not act on becomes [`Event::Other`], so classification is
//! an exhaustive `match` rather than a runtime type inspection.

use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Repository identity (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Check suite lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSuiteAction {
    Created,
    Requested,
    Rerequested,
    Completed,
    Other(String),
}

impl CheckSuiteAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "created" => Self::Created,
            "requested" => Self::Requested,
            "rerequested" => Self::Rerequested,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this action should start a validation run.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Created | Self::Requested | Self::Rerequested)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Requested => "requested",
            Self::Rerequested => "rerequested",
            Self::Completed => "completed",
            Self::Other(other) => other,
        }
    }
}

/// Pull request action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestAction {
    Opened,
    Other(String),
}

impl PullRequestAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "opened" => Self::Opened,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Other(other) => other,
        }
    }
}

/// Pull request associated with a check suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedPullRequest {
    pub number: u64,
    pub head_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSuiteEvent {
    pub action: CheckSuiteAction,
    pub repo: RepoRef,
    /// Head commit of the check suite.
    pub head_sha: String,
    pub pull_requests: Vec<AssociatedPullRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub repo: RepoRef,
    pub number: u64,
    pub head_sha: String,
}

/// An inbound repository event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CheckSuite(CheckSuiteEvent),
    PullRequest(PullRequestEvent),
    /// Any event kind the pipeline does not handle.
    Other { kind: String },
}

impl Event {
    /// Short name of the event kind, for logs.
    pub fn kind(&self) -> &str {
        match self {
            Event::CheckSuite(_) => "check_suite",
            Event::PullRequest(_) => "pull_request",
            Event::Other { kind } => kind,
        }
    }

    /// Decode a webhook delivery given its event name header
    /// (`X-GitHub-Event` / `GITHUB_EVENT_NAME`) and JSON body.
    pub fn from_webhook(event_name: &str, payload: &[u8]) -> Result<Self, EventError> {
        let decode_err = |source| EventError::Payload {
            kind: event_name.to_string(),
            source,
        };
        match event_name {
            "check_suite" => {
                let raw: wire::CheckSuitePayload =
                    serde_json::from_slice(payload).map_err(decode_err)?;
                Ok(Event::CheckSuite(raw.into()))
            }
            "pull_request" => {
                let raw: wire::PullRequestPayload =
                    serde_json::from_slice(payload).map_err(decode_err)?;
                Ok(Event::PullRequest(raw.into()))
            }
            other => Ok(Event::Other {
                kind: other.to_string(),
            }),
        }
    }
}

/// What the pipeline should do with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the check-run validation pipeline.
    Validate(CheckSuiteEvent),
    /// Ask the host to create a check suite for this commit.
    RequestCheckSuite { repo: RepoRef, head_sha: String },
    /// Nothing to do.
    Ignore { reason: String },
}

/// Map an event to an action.
pub fn classify(event: Event) -> Action {
    match event {
        Event::CheckSuite(suite) if suite.action.is_actionable() => Action::Validate(suite),
        Event::CheckSuite(suite) => Action::Ignore {
            reason: format!("check_suite action '{}'", suite.action.as_str()),
        },
        Event::PullRequest(pr) => match pr.action {
            PullRequestAction::Opened => Action::RequestCheckSuite {
                repo: pr.repo,
                head_sha: pr.head_sha,
            },
            PullRequestAction::Other(action) => Action::Ignore {
                reason: format!("pull_request action '{}'", action),
            },
        },
        Event::Other { kind } => Action::Ignore {
            reason: format!("event kind '{}'", kind),
        },
    }
}

/// Webhook payload shapes (only the fields the pipeline reads).
mod wire {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    pub(super) struct Owner {
        pub login: String,
    }

    #[derive(Deserialize)]
    pub(super) struct Repository {
        pub name: String,
        pub owner: Owner,
    }

    impl From<Repository> for RepoRef {
        fn from(repo: Repository) -> Self {
            RepoRef::new(repo.owner.login, repo.name)
        }
    }

    #[derive(Deserialize)]
    pub(super) struct Head {
        pub sha: String,
    }

    #[derive(Deserialize)]
    pub(super) struct SuitePullRequest {
        pub number: u64,
        pub head: Head,
    }

    #[derive(Deserialize)]
    pub(super) struct CheckSuite {
        pub head_sha: String,
        #[serde(default)]
        pub pull_requests: Vec<SuitePullRequest>,
    }

    #[derive(Deserialize)]
    pub(super) struct CheckSuitePayload {
        pub action: String,
        pub check_suite: CheckSuite,
        pub repository: Repository,
    }

    impl From<CheckSuitePayload> for CheckSuiteEvent {
        fn from(raw: CheckSuitePayload) -> Self {
            CheckSuiteEvent {
                action: CheckSuiteAction::parse(&raw.action),
                repo: raw.repository.into(),
                head_sha: raw.check_suite.head_sha,
                pull_requests: raw
                    .check_suite
                    .pull_requests
                    .into_iter()
                    .map(|pr| AssociatedPullRequest {
                        number: pr.number,
                        head_sha: pr.head.sha,
                    })
                    .collect(),
            }
        }
    }

    #[derive(Deserialize)]
    pub(super) struct PullRequest {
        pub head: Head,
    }

    #[derive(Deserialize)]
    pub(super) struct PullRequestPayload {
        pub action: String,
        pub number: u64,
        pub pull_request: PullRequest,
        pub repository: Repository,
    }

    impl From<PullRequestPayload> for PullRequestEvent {
        fn from(raw: PullRequestPayload) -> Self {
            PullRequestEvent {
                action: PullRequestAction::parse(&raw.action),
                repo: raw.repository.into(),
                number: raw.number,
                head_sha: raw.pull_request.head.sha,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suite(action: CheckSuiteAction) -> CheckSuiteEvent {
        CheckSuiteEvent {
            action,
            repo: RepoRef::new("org", "infra"),
            head_sha: "abc123".to_string(),
            pull_requests: vec![AssociatedPullRequest {
                number: 1,
                head_sha: "abc123".to_string(),
            }],
        }
    }

    #[test]
    fn test_actionable_check_suite_actions_validate() {
        for action in [
            CheckSuiteAction::Created,
            CheckSuiteAction::Requested,
            CheckSuiteAction::Rerequested,
        ] {
            let event = suite(action);
            assert_eq!(
                classify(Event::CheckSuite(event.clone())),
                Action::Validate(event)
            );
        }
    }

    #[test]
    fn test_other_check_suite_actions_ignored() {
        for action in [
            CheckSuiteAction::Completed,
            CheckSuiteAction::Other("deleted".to_string()),
        ] {
            let action = classify(Event::CheckSuite(suite(action)));
            assert!(matches!(action, Action::Ignore { .. }));
        }
    }

    #[test]
    fn test_opened_pull_request_requests_check_suite() {
        let event = Event::PullRequest(PullRequestEvent {
            action: PullRequestAction::Opened,
            repo: RepoRef::new("org", "infra"),
            number: 9,
            head_sha: "def456".to_string(),
        });
        assert_eq!(
            classify(event),
            Action::RequestCheckSuite {
                repo: RepoRef::new("org", "infra"),
                head_sha: "def456".to_string(),
            }
        );
    }

    #[test]
    fn test_other_pull_request_actions_and_kinds_ignored() {
        let event = Event::PullRequest(PullRequestEvent {
            action: PullRequestAction::parse("synchronize"),
            repo: RepoRef::new("org", "infra"),
            number: 9,
            head_sha: "def456".to_string(),
        });
        assert!(matches!(classify(event), Action::Ignore { .. }));
        assert!(matches!(
            classify(Event::Other {
                kind: "push".to_string()
            }),
            Action::Ignore { .. }
        ));
    }

    #[test]
    fn test_decode_check_suite_payload() {
        let payload = json!({
            "action": "requested",
            "check_suite": {
                "id": 5,
                "head_sha": "abc123",
                "pull_requests": [
                    { "number": 12, "head": { "sha": "abc123", "ref": "feature" } }
                ]
            },
            "repository": { "name": "infra", "owner": { "login": "org" } }
        });
        let event = Event::from_webhook("check_suite", payload.to_string().as_bytes())
            .expect("decode");
        let Event::CheckSuite(suite) = event else {
            panic!("expected check suite event");
        };
        assert_eq!(suite.action, CheckSuiteAction::Requested);
        assert_eq!(suite.repo.to_string(), "org/infra");
        assert_eq!(suite.pull_requests.len(), 1);
        assert_eq!(suite.pull_requests[0].number, 12);
    }

    #[test]
    fn test_decode_pull_request_payload() {
        let payload = json!({
            "action": "opened",
            "number": 3,
            "pull_request": { "head": { "sha": "fff000" } },
            "repository": { "name": "infra", "owner": { "login": "org" } }
        });
        let event = Event::from_webhook("pull_request", payload.to_string().as_bytes())
            .expect("decode");
        assert_eq!(
            event,
            Event::PullRequest(PullRequestEvent {
                action: PullRequestAction::Opened,
                repo: RepoRef::new("org", "infra"),
                number: 3,
                head_sha: "fff000".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_kind_is_other() {
        let event = Event::from_webhook("push", b"{}").expect("decode");
        assert_eq!(event.kind(), "push");
    }

    #[test]
    fn test_malformed_known_payload_is_error() {
        let err = Event::from_webhook("check_suite", b"{\"action\": 1}").unwrap_err();
        assert!(err.to_string().contains("check_suite"));
    }
}
