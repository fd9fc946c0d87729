//! Files changed by the pull requests tied to a check suite.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::client::RepositoryClient;
use crate::error::PipelineError;
use crate::event::CheckSuiteEvent;

/// Diff status of a changed file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl FileStatus {
    /// Whether content exists at the head ref.
    pub fn has_content(&self) -> bool {
        !matches!(self, FileStatus::Removed)
    }
}

/// A file touched by a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedFile {
    #[serde(rename = "filename")]
    pub path: String,
    pub blob_url: String,
    pub status: FileStatus,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, blob_url: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            blob_url: blob_url.into(),
            status,
        }
    }
}

/// List the files changed by every pull request associated with the suite.
///
/// Pull requests are visited in payload order; a path listed by more than one
/// pull request keeps its first occurrence. The first listing failure aborts
/// extraction.
pub async fn extract_changed_files(
    repo_client: &dyn RepositoryClient,
    suite: &CheckSuiteEvent,
) -> Result<Vec<ChangedFile>, PipelineError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pr in &suite.pull_requests {
        let listed = repo_client
            .list_changed_files(&suite.repo, pr.number)
            .await
            .map_err(|source| PipelineError::ListChangedFiles {
                number: pr.number,
                source,
            })?;

        for file in listed {
            if seen.insert(file.path.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AssociatedPullRequest, CheckSuiteAction, RepoRef};
    use crate::fakes::MemoryGitHub;

    fn suite_with_prs(numbers: &[u64]) -> CheckSuiteEvent {
        CheckSuiteEvent {
            action: CheckSuiteAction::Requested,
            repo: RepoRef::new("org", "infra"),
            head_sha: "abc123".to_string(),
            pull_requests: numbers
                .iter()
                .map(|n| AssociatedPullRequest {
                    number: *n,
                    head_sha: "abc123".to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_no_pull_requests_yields_empty_change_set() {
        let gh = MemoryGitHub::new();
        let files = extract_changed_files(&gh, &suite_with_prs(&[]))
            .await
            .expect("extract");
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_pull_requests_dedupe_by_path() {
        let gh = MemoryGitHub::new()
            .with_pull_request_files(
                1,
                vec![
                    ChangedFile::new("k8s/a.yaml", "", FileStatus::Added),
                    ChangedFile::new("k8s/b.yaml", "", FileStatus::Modified),
                ],
            )
            .with_pull_request_files(
                2,
                vec![
                    ChangedFile::new("k8s/b.yaml", "", FileStatus::Removed),
                    ChangedFile::new("k8s/c.yaml", "", FileStatus::Added),
                ],
            );

        let files = extract_changed_files(&gh, &suite_with_prs(&[1, 2]))
            .await
            .expect("extract");
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["k8s/a.yaml", "k8s/b.yaml", "k8s/c.yaml"]);
        assert_eq!(files[1].status, FileStatus::Modified);
    }

    #[tokio::test]
    async fn test_listing_failure_is_reported() {
        let gh = MemoryGitHub::new().failing_file_listing();
        let err = extract_changed_files(&gh, &suite_with_prs(&[4]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ListChangedFiles { number: 4, .. }));
    }
}
