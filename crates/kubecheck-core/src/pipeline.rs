//! Check-run validation pipeline.
//!
//! `process` turns one repository event into at most one completed check run:
//!
//! 1. classify the event
//! 2. create an in-progress check run
//! 3. resolve configuration (failure completes the run immediately)
//! 4. list changed files (failure leaves the run in progress for redelivery)
//! 5. select candidates, fetch and validate them
//! 6. complete the run with the aggregated annotations
//!
//! Nothing is returned to the caller; outcomes are visible through check run
//! state and the injected observer.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::annotation::Annotation;
use crate::changeset::extract_changed_files;
use crate::client::{CheckRunClient, RepositoryClient};
use crate::config::ConfigSource;
use crate::error::PipelineError;
use crate::event::{classify, Action, CheckSuiteEvent, Event, RepoRef};
use crate::matcher::{match_candidates, Candidates, ValidationCandidate};
use crate::obs::{PipelineEvent, PipelineObserver, TracingObserver};
use crate::report::{start_check_run, CompletedRun, InProgressRun, ValidationReport};
use crate::validate::validate;

/// Default number of candidates fetched and validated concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Findings for one file, grouped by schema in evaluation order.
#[derive(Debug)]
struct FileResult {
    path: String,
    groups: Vec<Vec<Annotation>>,
}

impl FileResult {
    fn annotation_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

/// Stateless pipeline; one instance can serve any number of events.
pub struct Pipeline {
    checks: Arc<dyn CheckRunClient>,
    repos: Arc<dyn RepositoryClient>,
    config: Arc<dyn ConfigSource>,
    observer: Arc<dyn PipelineObserver>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        checks: Arc<dyn CheckRunClient>,
        repos: Arc<dyn RepositoryClient>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            checks,
            repos,
            config,
            observer: Arc::new(TracingObserver),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound on concurrent candidate fetches (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Handle one inbound event.
    pub async fn process(&self, event: Event) {
        let span = tracing::info_span!(
            "kubecheck.process",
            invocation_id = %Uuid::new_v4(),
            event_kind = %event.kind(),
        );

        async move {
            match classify(event) {
                Action::Validate(suite) => self.run_check_suite(&suite).await,
                Action::RequestCheckSuite { repo, head_sha } => {
                    self.request_check_suite(&repo, &head_sha).await
                }
                Action::Ignore { reason } => {
                    self.observer.emit(PipelineEvent::EventIgnored { reason })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn request_check_suite(&self, repo: &RepoRef, head_sha: &str) {
        let outcome = self
            .checks
            .request_check_suite(repo, head_sha)
            .await
            .map_err(|source| PipelineError::RequestCheckSuite {
                head_sha: head_sha.to_string(),
                source,
            });
        match outcome {
            Ok(()) => self.observer.emit(PipelineEvent::CheckSuiteRequested {
                repo: repo.to_string(),
                head_sha: head_sha.to_string(),
            }),
            Err(error) => self.observer.emit(PipelineEvent::CheckSuiteRequestFailed {
                repo: repo.to_string(),
                error: error.to_string(),
            }),
        }
    }

    async fn run_check_suite(&self, suite: &CheckSuiteEvent) {
        let repo = suite.repo.to_string();

        let run = match start_check_run(self.checks.as_ref(), &suite.repo, &suite.head_sha).await {
            Ok(run) => run,
            Err(error) => {
                self.observer.emit(PipelineEvent::CheckRunCreateFailed {
                    repo,
                    error: error.to_string(),
                });
                return;
            }
        };
        self.observer.emit(PipelineEvent::CheckRunCreated {
            repo: repo.clone(),
            check_run_id: run.handle().id,
            head_sha: suite.head_sha.clone(),
        });

        let resolution = match self.config.resolve(&suite.repo, &suite.head_sha).await {
            Ok(resolution) => resolution,
            Err(error) => {
                self.observer.emit(PipelineEvent::ConfigMissing {
                    repo,
                    error: error.to_string(),
                });
                let check_run_id = run.handle().id;
                let outcome = run
                    .complete_config_error(self.checks.as_ref(), self.config.config_path(), &error)
                    .await;
                self.observe_completion(check_run_id, outcome);
                return;
            }
        };

        let changed = match extract_changed_files(self.repos.as_ref(), suite).await {
            Ok(changed) => changed,
            Err(error) => {
                // The run stays in progress; redelivery of the event retries everything.
                self.observer.emit(PipelineEvent::ChangeSetFailed {
                    repo,
                    error: error.to_string(),
                });
                return;
            }
        };

        let candidates = match_candidates(&resolution.config, &changed);
        self.observer.emit(PipelineEvent::CandidatesSelected {
            changed: changed.len(),
            candidates: candidates.len(),
        });

        let report = self
            .validate_candidates(suite, resolution.notice, candidates)
            .await;
        self.finish(run, report).await;
    }

    async fn finish(&self, run: InProgressRun, report: ValidationReport) {
        let check_run_id = run.handle().id;
        let outcome = run.complete(self.checks.as_ref(), report).await;
        self.observe_completion(check_run_id, outcome);
    }

    fn observe_completion(&self, check_run_id: u64, outcome: Result<CompletedRun, PipelineError>) {
        match outcome {
            Ok(completed) => self.observer.emit(PipelineEvent::CheckRunFinalized {
                check_run_id,
                conclusion: completed.conclusion,
                annotations: completed.annotations,
                duration_ms: completed.duration_ms,
            }),
            Err(error) => self.observer.emit(PipelineEvent::CheckRunFinalizeFailed {
                check_run_id,
                error: error.to_string(),
            }),
        }
    }

    /// Fetch and validate every candidate, then order the findings by path,
    /// schema evaluation order and line, whatever order the work finished in.
    async fn validate_candidates(
        &self,
        suite: &CheckSuiteEvent,
        notice: Option<Annotation>,
        candidates: Candidates,
    ) -> ValidationReport {
        let files_checked: Vec<String> = candidates.keys().cloned().collect();

        let mut results: Vec<FileResult> = stream::iter(candidates.into_values())
            .map(|candidate| self.check_candidate(suite, candidate))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.path.cmp(&b.path));

        let annotations = notice
            .into_iter()
            .chain(
                results
                    .into_iter()
                    .flat_map(|result| result.groups.into_iter().flatten()),
            )
            .collect();

        ValidationReport {
            files_checked,
            annotations,
        }
    }

    async fn check_candidate(
        &self,
        suite: &CheckSuiteEvent,
        candidate: ValidationCandidate,
    ) -> FileResult {
        let file = &candidate.file;
        let bytes = match self
            .repos
            .fetch_file_content(&suite.repo, &suite.head_sha, &file.path)
            .await
        {
            Ok(bytes) => bytes,
            Err(error) => {
                self.observer.emit(PipelineEvent::FileFetchFailed {
                    path: file.path.clone(),
                    error: error.to_string(),
                });
                return FileResult {
                    path: file.path.clone(),
                    groups: vec![vec![Annotation::failure(
                        &file.path,
                        &file.blob_url,
                        1,
                        format!("Error loading {} from GitHub", file.path),
                        error.to_string(),
                    )]],
                };
            }
        };

        let mut groups = if candidate.schemas.is_empty() {
            vec![validate(&bytes, file, None)]
        } else {
            candidate
                .schemas
                .iter()
                .map(|schema| validate(&bytes, file, Some(schema)))
                .collect()
        };
        for group in &mut groups {
            group.sort_by_key(|a| a.start_line);
        }

        let result = FileResult {
            path: file.path.clone(),
            groups,
        };
        self.observer.emit(PipelineEvent::FileValidated {
            path: result.path.clone(),
            schemas: candidate.schemas.len(),
            annotations: result.annotation_count(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangedFile, FileStatus};
    use crate::config::{RepositoryConfigSource, DEFAULT_CONFIG_PATH};
    use crate::event::{AssociatedPullRequest, CheckSuiteAction};
    use crate::fakes::{MemoryGitHub, RecordingObserver};

    const CONFIG: &str = "apiVersion: v1alpha1\nkind: KubeValidatorConfig\nspec:\n  manifests:\n    - glob: k8s/*.yaml\n";

    fn pipeline(gh: Arc<MemoryGitHub>, obs: Arc<RecordingObserver>) -> Pipeline {
        let config = Arc::new(RepositoryConfigSource::new(gh.clone()));
        Pipeline::new(gh.clone(), gh, config).with_observer(obs)
    }

    fn suite() -> Event {
        Event::CheckSuite(CheckSuiteEvent {
            action: CheckSuiteAction::Created,
            repo: RepoRef::new("org", "infra"),
            head_sha: "abc123".to_string(),
            pull_requests: vec![AssociatedPullRequest {
                number: 1,
                head_sha: "abc123".to_string(),
            }],
        })
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_validation_of_that_file() {
        let gh = Arc::new(
            MemoryGitHub::new()
                .with_file(DEFAULT_CONFIG_PATH, CONFIG)
                .with_pull_request_files(
                    1,
                    vec![
                        ChangedFile::new("k8s/a.yaml", "https://blob/a", FileStatus::Added),
                        ChangedFile::new("k8s/b.yaml", "https://blob/b", FileStatus::Added),
                    ],
                )
                .with_file("k8s/b.yaml", "kind: B\n")
                .failing_fetch("k8s/a.yaml"),
        );
        let obs = Arc::new(RecordingObserver::new());
        pipeline(gh.clone(), obs.clone()).process(suite()).await;

        let finalized = gh.finalized();
        assert_eq!(finalized.len(), 1);
        let annotations = &finalized[0].1.annotations;
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].path, "k8s/a.yaml");
        assert_eq!(annotations[0].title, "Error loading k8s/a.yaml from GitHub");
        assert_eq!(annotations[0].start_line, 1);
        assert!(obs.names().contains(&"file.fetch_failed"));
    }

    #[tokio::test]
    async fn test_create_failure_aborts_invocation() {
        let gh = Arc::new(
            MemoryGitHub::new()
                .with_file(DEFAULT_CONFIG_PATH, CONFIG)
                .failing_check_run_creation(),
        );
        let obs = Arc::new(RecordingObserver::new());
        pipeline(gh.clone(), obs.clone()).process(suite()).await;

        assert_eq!(gh.outbound_calls(), 1);
        assert!(gh.finalized().is_empty());
        assert_eq!(obs.names(), vec!["check_run.create_failed"]);
    }

    #[tokio::test]
    async fn test_finalize_failure_is_observed_not_retried() {
        let gh = Arc::new(
            MemoryGitHub::new()
                .with_file(DEFAULT_CONFIG_PATH, CONFIG)
                .failing_check_run_finalization(),
        );
        let obs = Arc::new(RecordingObserver::new());
        pipeline(gh.clone(), obs.clone()).process(suite()).await;

        assert_eq!(gh.finalized().len(), 1);
        assert_eq!(obs.names().last(), Some(&"check_run.finalize_failed"));
    }

    #[tokio::test]
    async fn test_suite_request_failure_is_observed() {
        let gh = Arc::new(MemoryGitHub::new().failing_check_suite_request());
        let obs = Arc::new(RecordingObserver::new());
        let event = Event::PullRequest(crate::event::PullRequestEvent {
            action: crate::event::PullRequestAction::Opened,
            repo: RepoRef::new("org", "infra"),
            number: 2,
            head_sha: "fff".to_string(),
        });
        pipeline(gh.clone(), obs.clone()).process(event).await;

        assert_eq!(gh.suite_requests().len(), 1);
        assert_eq!(obs.names(), vec!["check_suite.request_failed"]);
        match &obs.events()[0] {
            PipelineEvent::CheckSuiteRequestFailed { error, .. } => {
                assert!(error.contains("fff"), "error should name the commit: {}", error)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
