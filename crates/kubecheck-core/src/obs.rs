//! Structured observability for pipeline invocations.
//!
//! The pipeline reports lifecycle milestones as [`PipelineEvent`]s to an
//! injected [`PipelineObserver`] instead of logging directly. The default
//! [`TracingObserver`] turns each one into a `tracing` event with an
//! `event = "..."` field; tests use `fakes::RecordingObserver`.

use crate::annotation::Conclusion;

/// A milestone or failure inside one `process` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    EventIgnored {
        reason: String,
    },
    CheckSuiteRequested {
        repo: String,
        head_sha: String,
    },
    CheckSuiteRequestFailed {
        repo: String,
        error: String,
    },
    CheckRunCreated {
        repo: String,
        check_run_id: u64,
        head_sha: String,
    },
    CheckRunCreateFailed {
        repo: String,
        error: String,
    },
    ConfigMissing {
        repo: String,
        error: String,
    },
    ChangeSetFailed {
        repo: String,
        error: String,
    },
    CandidatesSelected {
        changed: usize,
        candidates: usize,
    },
    FileFetchFailed {
        path: String,
        error: String,
    },
    FileValidated {
        path: String,
        schemas: usize,
        annotations: usize,
    },
    CheckRunFinalized {
        check_run_id: u64,
        conclusion: Conclusion,
        annotations: usize,
        duration_ms: u64,
    },
    CheckRunFinalizeFailed {
        check_run_id: u64,
        error: String,
    },
}

impl PipelineEvent {
    /// Dotted event name used as the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::EventIgnored { .. } => "event.ignored",
            PipelineEvent::CheckSuiteRequested { .. } => "check_suite.requested",
            PipelineEvent::CheckSuiteRequestFailed { .. } => "check_suite.request_failed",
            PipelineEvent::CheckRunCreated { .. } => "check_run.created",
            PipelineEvent::CheckRunCreateFailed { .. } => "check_run.create_failed",
            PipelineEvent::ConfigMissing { .. } => "config.missing",
            PipelineEvent::ChangeSetFailed { .. } => "changeset.failed",
            PipelineEvent::CandidatesSelected { .. } => "candidates.selected",
            PipelineEvent::FileFetchFailed { .. } => "file.fetch_failed",
            PipelineEvent::FileValidated { .. } => "file.validated",
            PipelineEvent::CheckRunFinalized { .. } => "check_run.finalized",
            PipelineEvent::CheckRunFinalizeFailed { .. } => "check_run.finalize_failed",
        }
    }
}

/// Sink for pipeline events.
pub trait PipelineObserver: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn emit(&self, event: PipelineEvent) {
        let name = event.name();
        match event {
            PipelineEvent::EventIgnored { reason } => {
                tracing::debug!(event = name, reason = %reason);
            }
            PipelineEvent::CheckSuiteRequested { repo, head_sha } => {
                tracing::info!(event = name, repo = %repo, head_sha = %head_sha);
            }
            PipelineEvent::CheckSuiteRequestFailed { repo, error }
            | PipelineEvent::CheckRunCreateFailed { repo, error }
            | PipelineEvent::ChangeSetFailed { repo, error } => {
                tracing::error!(event = name, repo = %repo, error = %error);
            }
            PipelineEvent::CheckRunCreated {
                repo,
                check_run_id,
                head_sha,
            } => {
                tracing::info!(event = name, repo = %repo, check_run_id, head_sha = %head_sha);
            }
            PipelineEvent::ConfigMissing { repo, error } => {
                tracing::warn!(event = name, repo = %repo, error = %error);
            }
            PipelineEvent::CandidatesSelected {
                changed,
                candidates,
            } => {
                tracing::info!(event = name, changed, candidates);
            }
            PipelineEvent::FileFetchFailed { path, error } => {
                tracing::warn!(event = name, path = %path, error = %error);
            }
            PipelineEvent::FileValidated {
                path,
                schemas,
                annotations,
            } => {
                tracing::debug!(event = name, path = %path, schemas, annotations);
            }
            PipelineEvent::CheckRunFinalized {
                check_run_id,
                conclusion,
                annotations,
                duration_ms,
            } => {
                tracing::info!(
                    event = name,
                    check_run_id,
                    conclusion = conclusion.as_str(),
                    annotations,
                    duration_ms,
                );
            }
            PipelineEvent::CheckRunFinalizeFailed {
                check_run_id,
                error,
            } => {
                tracing::error!(event = name, check_run_id, error = %error);
            }
        }
    }
}
