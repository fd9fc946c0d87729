//! In-memory fakes for the collaborator traits (testing only)
//!
//! `MemoryGitHub` satisfies `CheckRunClient` and `RepositoryClient` without a
//! network, records every outbound call, and can be told to fail specific
//! operations. `RecordingObserver` collects pipeline events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::changeset::ChangedFile;
use crate::client::{CheckRunClient, CheckRunCompletion, CheckRunHandle, RepositoryClient};
use crate::error::{ClientError, ClientResult};
use crate::event::RepoRef;
use crate::obs::{PipelineEvent, PipelineObserver};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unavailable(what: &str) -> ClientError {
    ClientError::Http {
        status: 503,
        message: format!("{} unavailable", what),
    }
}

// ---------------------------------------------------------------------------
// MemoryGitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Failures {
    create_check_run: bool,
    finalize_check_run: bool,
    list_files: bool,
    request_check_suite: bool,
    fetch_paths: HashSet<String>,
}

#[derive(Debug, Default)]
struct Calls {
    created: Vec<(RepoRef, String)>,
    finalized: Vec<(CheckRunHandle, CheckRunCompletion)>,
    suite_requests: Vec<(RepoRef, String)>,
    listed: Vec<u64>,
    fetched: Vec<String>,
}

impl Calls {
    fn total(&self) -> usize {
        self.created.len()
            + self.finalized.len()
            + self.suite_requests.len()
            + self.listed.len()
            + self.fetched.len()
    }
}

/// In-memory hosting platform backed by path -> bytes and PR -> files maps.
///
/// File contents are ref-agnostic: every ref sees the same tree.
#[derive(Debug, Default)]
pub struct MemoryGitHub {
    files: HashMap<String, Vec<u8>>,
    pull_request_files: HashMap<u64, Vec<ChangedFile>>,
    fetch_delays: HashMap<String, Duration>,
    failures: Failures,
    calls: Mutex<Calls>,
    next_id: AtomicU64,
}

impl MemoryGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.to_string(), content.as_ref().to_vec());
        self
    }

    pub fn with_pull_request_files(mut self, number: u64, files: Vec<ChangedFile>) -> Self {
        self.pull_request_files.insert(number, files);
        self
    }

    /// Delay fetches of `path`, to shuffle completion order.
    pub fn with_fetch_delay(mut self, path: &str, delay: Duration) -> Self {
        self.fetch_delays.insert(path.to_string(), delay);
        self
    }

    pub fn failing_check_run_creation(mut self) -> Self {
        self.failures.create_check_run = true;
        self
    }

    pub fn failing_check_run_finalization(mut self) -> Self {
        self.failures.finalize_check_run = true;
        self
    }

    pub fn failing_file_listing(mut self) -> Self {
        self.failures.list_files = true;
        self
    }

    pub fn failing_check_suite_request(mut self) -> Self {
        self.failures.request_check_suite = true;
        self
    }

    pub fn failing_fetch(mut self, path: &str) -> Self {
        self.failures.fetch_paths.insert(path.to_string());
        self
    }

    /// `(repo, head_sha)` of every check run creation attempt.
    pub fn created(&self) -> Vec<(RepoRef, String)> {
        lock(&self.calls).created.clone()
    }

    /// Every finalization attempt with what was sent.
    pub fn finalized(&self) -> Vec<(CheckRunHandle, CheckRunCompletion)> {
        lock(&self.calls).finalized.clone()
    }

    pub fn suite_requests(&self) -> Vec<(RepoRef, String)> {
        lock(&self.calls).suite_requests.clone()
    }

    /// Pull request numbers whose files were listed.
    pub fn listed(&self) -> Vec<u64> {
        lock(&self.calls).listed.clone()
    }

    /// Paths fetched, in call order.
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.calls).fetched.clone()
    }

    /// Total number of outbound calls of any kind.
    pub fn outbound_calls(&self) -> usize {
        lock(&self.calls).total()
    }
}

#[async_trait]
impl CheckRunClient for MemoryGitHub {
    async fn create_check_run(
        &self,
        repo: &RepoRef,
        head_sha: &str,
    ) -> ClientResult<CheckRunHandle> {
        lock(&self.calls)
            .created
            .push((repo.clone(), head_sha.to_string()));
        if self.failures.create_check_run {
            return Err(unavailable("check runs"));
        }
        Ok(CheckRunHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            repo: repo.clone(),
            head_sha: head_sha.to_string(),
        })
    }

    async fn finalize_check_run(
        &self,
        handle: &CheckRunHandle,
        completion: CheckRunCompletion,
    ) -> ClientResult<()> {
        lock(&self.calls)
            .finalized
            .push((handle.clone(), completion));
        if self.failures.finalize_check_run {
            return Err(unavailable("check runs"));
        }
        Ok(())
    }

    async fn request_check_suite(&self, repo: &RepoRef, head_sha: &str) -> ClientResult<()> {
        lock(&self.calls)
            .suite_requests
            .push((repo.clone(), head_sha.to_string()));
        if self.failures.request_check_suite {
            return Err(unavailable("check suites"));
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryClient for MemoryGitHub {
    async fn list_changed_files(
        &self,
        _repo: &RepoRef,
        pull_request: u64,
    ) -> ClientResult<Vec<ChangedFile>> {
        lock(&self.calls).listed.push(pull_request);
        if self.failures.list_files {
            return Err(unavailable("pull request files"));
        }
        Ok(self
            .pull_request_files
            .get(&pull_request)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_file_content(
        &self,
        _repo: &RepoRef,
        _git_ref: &str,
        path: &str,
    ) -> ClientResult<Vec<u8>> {
        lock(&self.calls).fetched.push(path.to_string());
        if let Some(delay) = self.fetch_delays.get(path) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.fetch_paths.contains(path) {
            return Err(unavailable("contents"));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                path: path.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Observer that keeps every event it sees.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        lock(&self.events).clone()
    }

    /// Names of the recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(PipelineEvent::name).collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn emit(&self, event: PipelineEvent) {
        lock(&self.events).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::FileStatus;

    #[tokio::test]
    async fn test_memory_github_records_calls() {
        let gh = MemoryGitHub::new()
            .with_file("a.yaml", "kind: A")
            .with_pull_request_files(1, vec![ChangedFile::new("a.yaml", "", FileStatus::Added)]);
        let repo = RepoRef::new("org", "infra");

        let handle = gh.create_check_run(&repo, "abc").await.expect("create");
        assert_eq!(handle.id, 1);
        assert_eq!(gh.list_changed_files(&repo, 1).await.expect("list").len(), 1);
        assert_eq!(
            gh.fetch_file_content(&repo, "abc", "a.yaml").await.expect("fetch"),
            b"kind: A".to_vec()
        );
        assert!(matches!(
            gh.fetch_file_content(&repo, "abc", "missing.yaml").await,
            Err(ClientError::NotFound { .. })
        ));
        assert_eq!(gh.outbound_calls(), 4);
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let obs = RecordingObserver::new();
        obs.emit(PipelineEvent::EventIgnored {
            reason: "push".to_string(),
        });
        obs.emit(PipelineEvent::CandidatesSelected {
            changed: 2,
            candidates: 1,
        });
        assert_eq!(obs.names(), vec!["event.ignored", "candidates.selected"]);
    }
}
