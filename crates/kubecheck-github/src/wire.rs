//! Request and response bodies of the GitHub REST endpoints in use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kubecheck_core::{Annotation, ChangedFile, CheckRunCompletion, FileStatus};

/// Most annotations the checks API accepts in one request.
pub const MAX_ANNOTATIONS_PER_REQUEST: usize = 50;

/// Page size used when listing pull request files.
pub const FILES_PER_PAGE: usize = 100;

/// The files endpoint stops at 3000 entries.
pub const MAX_FILE_PAGES: usize = 30;

#[derive(Debug, Serialize)]
pub struct CreateCheckRun<'a> {
    pub name: &'a str,
    pub head_sha: &'a str,
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
}

impl<'a> CreateCheckRun<'a> {
    pub fn in_progress(name: &'a str, head_sha: &'a str, started_at: DateTime<Utc>) -> Self {
        Self {
            name,
            head_sha,
            status: "in_progress",
            started_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckRunCreated {
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct Output<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub annotations: &'a [Annotation],
}

/// Body of a check run `PATCH`.
///
/// Only the first update of a completion carries the status fields; the
/// follow-ups just append annotations to the same output.
#[derive(Debug, Serialize)]
pub struct UpdateCheckRun<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Output<'a>,
}

/// Split a completion into the sequence of updates that delivers it.
///
/// Always yields at least one update, the completing one.
pub fn completion_updates(
    completion: &CheckRunCompletion,
    completed_at: DateTime<Utc>,
) -> Vec<UpdateCheckRun<'_>> {
    let mut chunks = completion.annotations.chunks(MAX_ANNOTATIONS_PER_REQUEST);
    let first: &[Annotation] = chunks.next().unwrap_or(&[]);

    let mut updates = vec![UpdateCheckRun {
        status: Some("completed"),
        conclusion: Some(completion.conclusion.as_str()),
        completed_at: Some(completed_at),
        output: Output {
            title: &completion.title,
            summary: &completion.summary,
            annotations: first,
        },
    }];
    updates.extend(chunks.map(|annotations| UpdateCheckRun {
        status: None,
        conclusion: None,
        completed_at: None,
        output: Output {
            title: &completion.title,
            summary: &completion.summary,
            annotations,
        },
    }));
    updates
}

#[derive(Debug, Serialize)]
pub struct CreateCheckSuite<'a> {
    pub head_sha: &'a str,
}

/// Entry of `GET /repos/{owner}/{repo}/pulls/{number}/files`.
#[derive(Debug, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub blob_url: Option<String>,
    pub status: FileStatus,
}

impl From<PullRequestFile> for ChangedFile {
    fn from(file: PullRequestFile) -> Self {
        ChangedFile::new(file.filename, file.blob_url.unwrap_or_default(), file.status)
    }
}

/// Whether another page may follow one of `len` entries.
pub fn has_next_page(len: usize, page: usize) -> bool {
    len == FILES_PER_PAGE && page < MAX_FILE_PAGES
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecheck_core::Conclusion;

    fn sample(annotations: usize) -> CheckRunCompletion {
        CheckRunCompletion {
            conclusion: Conclusion::Failure,
            title: "1 file checked, 1 failure".to_string(),
            summary: "## summary".to_string(),
            annotations: (0..annotations)
                .map(|i| Annotation::failure("k8s/a.yaml", "", i + 1, "t", "m"))
                .collect(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_small_completion_is_one_update() {
        let completion = sample(3);
        let updates = completion_updates(&completion, Utc::now());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, Some("completed"));
        assert_eq!(updates[0].conclusion, Some("failure"));
        assert_eq!(updates[0].output.annotations.len(), 3);
    }

    #[test]
    fn test_empty_completion_still_completes() {
        let completion = sample(0);
        let updates = completion_updates(&completion, Utc::now());
        assert_eq!(updates.len(), 1);
        assert!(updates[0].output.annotations.is_empty());
    }

    #[test]
    fn test_annotations_are_batched_by_fifty() {
        let completion = sample(120);
        let updates = completion_updates(&completion, Utc::now());
        let sizes: Vec<usize> = updates.iter().map(|u| u.output.annotations.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert!(updates[1..].iter().all(|u| u.status.is_none()));
        assert_eq!(updates[2].output.annotations[0].start_line, 101);
    }

    #[test]
    fn test_update_serializes_annotation_level() {
        let completion = sample(1);
        let updates = completion_updates(&completion, Utc::now());
        let body = serde_json::to_value(&updates[0]).expect("serialize");
        assert_eq!(body["status"], "completed");
        assert_eq!(body["output"]["annotations"][0]["annotation_level"], "failure");
        assert_eq!(body["output"]["annotations"][0]["start_line"], 1);

        let larger = sample(51);
        let follow_up =
            serde_json::to_value(&completion_updates(&larger, Utc::now())[1]).expect("serialize");
        assert!(follow_up.get("status").is_none());
        assert!(follow_up.get("conclusion").is_none());
    }

    #[test]
    fn test_pull_request_file_decodes() {
        let raw = r#"[
            {"filename": "k8s/a.yaml", "blob_url": "https://github.com/o/r/blob/abc/k8s/a.yaml", "status": "modified", "additions": 1},
            {"filename": "old.yaml", "blob_url": null, "status": "removed"}
        ]"#;
        let files: Vec<PullRequestFile> = serde_json::from_str(raw).expect("decode");
        let files: Vec<ChangedFile> = files.into_iter().map(ChangedFile::from).collect();
        assert_eq!(files[0].path, "k8s/a.yaml");
        assert_eq!(files[0].status, FileStatus::Modified);
        assert_eq!(files[1].blob_url, "");
        assert_eq!(files[1].status, FileStatus::Removed);
    }

    #[test]
    fn test_pagination_stops_on_short_page() {
        assert!(has_next_page(FILES_PER_PAGE, 1));
        assert!(!has_next_page(FILES_PER_PAGE - 1, 1));
        assert!(!has_next_page(0, 1));
        assert!(!has_next_page(FILES_PER_PAGE, MAX_FILE_PAGES));
    }
}
