//! Collaborator traits for the hosting platform.
//!
//! These traits define everything the pipeline needs from the outside world:
//! - `CheckRunClient`: create / finalize check runs, request check suites
//! - `RepositoryClient`: list pull request files, fetch file contents
//!
//! All traits are async and transport-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, Conclusion};
use crate::changeset::ChangedFile;
use crate::error::ClientResult;
use crate::event::RepoRef;

/// Reference to an in-progress check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunHandle {
    pub id: u64,
    pub repo: RepoRef,
    pub head_sha: String,
}

/// Everything sent when a check run is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunCompletion {
    pub conclusion: Conclusion,
    pub title: String,
    /// Markdown summary.
    pub summary: String,
    pub annotations: Vec<Annotation>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait CheckRunClient: Send + Sync {
    /// Create an in-progress check run on `head_sha`.
    ///
    /// Not idempotent: calling twice creates two runs.
    async fn create_check_run(&self, repo: &RepoRef, head_sha: &str)
        -> ClientResult<CheckRunHandle>;

    /// Complete a check run. Called at most once per handle.
    async fn finalize_check_run(
        &self,
        handle: &CheckRunHandle,
        completion: CheckRunCompletion,
    ) -> ClientResult<()>;

    /// Ask the host to (re)create a check suite for `head_sha`.
    async fn request_check_suite(&self, repo: &RepoRef, head_sha: &str) -> ClientResult<()>;
}

#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Files changed by a pull request, in the order the host lists them.
    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        pull_request: u64,
    ) -> ClientResult<Vec<ChangedFile>>;

    /// Raw bytes of `path` at `git_ref`.
    async fn fetch_file_content(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> ClientResult<Vec<u8>>;
}
