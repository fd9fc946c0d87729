//! Check run lifecycle and report rendering.
//!
//! A check run moves `absent -> in_progress -> completed` exactly once:
//! [`InProgressRun`] is only obtainable from [`start_check_run`] and both
//! completion methods consume it, so a finalized run cannot be touched again.

use std::time::Instant;

use crate::annotation::{Annotation, Conclusion, LevelCounts};
use crate::client::{CheckRunClient, CheckRunCompletion, CheckRunHandle};
use crate::error::{ConfigError, PipelineError};
use crate::event::RepoRef;

/// Aggregated outcome of validating every candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Paths of the files that were checked, in report order.
    pub files_checked: Vec<String>,
    /// All findings, in report order.
    pub annotations: Vec<Annotation>,
}

impl ValidationReport {
    pub fn conclusion(&self) -> Conclusion {
        Conclusion::from_annotations(&self.annotations)
    }
}

/// A check run that has been created and not yet completed.
#[derive(Debug)]
pub struct InProgressRun {
    handle: CheckRunHandle,
    started: Instant,
}

/// What was sent when a run was completed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    pub handle: CheckRunHandle,
    pub conclusion: Conclusion,
    pub annotations: usize,
    pub duration_ms: u64,
}

/// Create the in-progress check run.
pub async fn start_check_run(
    client: &dyn CheckRunClient,
    repo: &RepoRef,
    head_sha: &str,
) -> Result<InProgressRun, PipelineError> {
    let started = Instant::now();
    let handle = client
        .create_check_run(repo, head_sha)
        .await
        .map_err(PipelineError::CreateCheckRun)?;
    Ok(InProgressRun { handle, started })
}

impl InProgressRun {
    pub fn handle(&self) -> &CheckRunHandle {
        &self.handle
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Complete with a single failure explaining why no configuration was usable.
    pub async fn complete_config_error(
        self,
        client: &dyn CheckRunClient,
        config_path: &str,
        error: &ConfigError,
    ) -> Result<CompletedRun, PipelineError> {
        let (title, remedy) = match error {
            ConfigError::Missing { .. } => (
                "Configuration missing",
                format!("Add `{}` and re-run the check.", config_path),
            ),
            ConfigError::Fetch(_) => (
                "Configuration unavailable",
                "The configuration could not be fetched; re-run the check.".to_string(),
            ),
            _ => (
                "Invalid configuration",
                format!("Fix `{}` and re-run the check.", config_path),
            ),
        };
        let annotation = Annotation::failure(
            config_path,
            "",
            error.line().unwrap_or(1),
            title,
            error.to_string(),
        );
        let summary = format!(
            "## {}\n\nNo manifests were validated.\n\n`{}`: {}\n\n{}\n",
            title, config_path, error, remedy
        );

        let duration_ms = self.elapsed_ms();
        self.send(
            client,
            CheckRunCompletion {
                conclusion: Conclusion::Failure,
                title: title.to_string(),
                summary,
                annotations: vec![annotation],
                duration_ms,
            },
        )
        .await
    }

    /// Complete with the aggregated validation findings.
    pub async fn complete(
        self,
        client: &dyn CheckRunClient,
        report: ValidationReport,
    ) -> Result<CompletedRun, PipelineError> {
        let duration_ms = self.elapsed_ms();
        let counts = LevelCounts::tally(&report.annotations);
        let completion = CheckRunCompletion {
            conclusion: report.conclusion(),
            title: render_title(report.files_checked.len(), &counts),
            summary: render_summary(&report, &counts, duration_ms),
            annotations: report.annotations,
            duration_ms,
        };
        self.send(client, completion).await
    }

    async fn send(
        self,
        client: &dyn CheckRunClient,
        completion: CheckRunCompletion,
    ) -> Result<CompletedRun, PipelineError> {
        let conclusion = completion.conclusion;
        let annotations = completion.annotations.len();
        let duration_ms = completion.duration_ms;

        client
            .finalize_check_run(&self.handle, completion)
            .await
            .map_err(|source| PipelineError::FinalizeCheckRun {
                check_run_id: self.handle.id,
                source,
            })?;

        Ok(CompletedRun {
            handle: self.handle,
            conclusion,
            annotations,
            duration_ms,
        })
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

pub fn render_title(files_checked: usize, counts: &LevelCounts) -> String {
    format!(
        "{} checked, {}",
        plural(files_checked, "file"),
        plural(counts.failures, "failure")
    )
}

/// Markdown summary shown on the check run page.
pub fn render_summary(report: &ValidationReport, counts: &LevelCounts, duration_ms: u64) -> String {
    let mut md = String::from("## Kubernetes manifest validation\n\n");

    md.push_str("| Level | Count |\n|---|---|\n");
    md.push_str(&format!("| failure | {} |\n", counts.failures));
    md.push_str(&format!("| warning | {} |\n", counts.warnings));
    md.push_str(&format!("| notice | {} |\n", counts.notices));

    md.push_str("\n### Files checked\n\n");
    if report.files_checked.is_empty() {
        md.push_str("No changed files matched the configuration.\n");
    } else {
        for path in &report.files_checked {
            let failures = report
                .annotations
                .iter()
                .filter(|a| a.is_failure() && &a.path == path)
                .count();
            let mark = if failures == 0 { "pass" } else { "fail" };
            md.push_str(&format!("- `{}` ({})\n", path, mark));
        }
    }

    md.push_str(&format!("\nCompleted in {} ms.\n", duration_ms));
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::fakes::MemoryGitHub;

    fn repo() -> RepoRef {
        RepoRef::new("org", "infra")
    }

    #[test]
    fn test_render_title_pluralizes() {
        let counts = LevelCounts {
            failures: 1,
            ..Default::default()
        };
        assert_eq!(render_title(1, &counts), "1 file checked, 1 failure");
        assert_eq!(
            render_title(3, &LevelCounts::default()),
            "3 files checked, 0 failures"
        );
    }

    #[test]
    fn test_render_summary_marks_failing_files() {
        let report = ValidationReport {
            files_checked: vec!["k8s/a.yaml".to_string(), "k8s/b.yaml".to_string()],
            annotations: vec![Annotation::failure("k8s/b.yaml", "", 2, "bad", "x")],
        };
        let counts = LevelCounts::tally(&report.annotations);
        let md = render_summary(&report, &counts, 42);
        assert!(md.contains("- `k8s/a.yaml` (pass)"));
        assert!(md.contains("- `k8s/b.yaml` (fail)"));
        assert!(md.contains("42 ms"));
    }

    #[tokio::test]
    async fn test_complete_derives_conclusion() {
        let gh = MemoryGitHub::new();
        let run = start_check_run(&gh, &repo(), "abc123").await.expect("start");
        let completed = run
            .complete(
                &gh,
                ValidationReport {
                    files_checked: vec!["k8s/a.yaml".to_string()],
                    annotations: vec![Annotation::failure("k8s/a.yaml", "", 1, "t", "m")],
                },
            )
            .await
            .expect("complete");
        assert_eq!(completed.conclusion, Conclusion::Failure);

        let finalized = gh.finalized();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].1.title, "1 file checked, 1 failure");
    }

    #[tokio::test]
    async fn test_config_error_completion_has_single_failure() {
        let gh = MemoryGitHub::new();
        let run = start_check_run(&gh, &repo(), "abc123").await.expect("start");
        let error = ConfigError::Missing {
            path: ".github/kubevalidator.yaml".to_string(),
        };
        let completed = run
            .complete_config_error(&gh, ".github/kubevalidator.yaml", &error)
            .await
            .expect("complete");
        assert_eq!(completed.conclusion, Conclusion::Failure);
        assert_eq!(completed.annotations, 1);

        let finalized = gh.finalized();
        assert_eq!(finalized[0].1.title, "Configuration missing");
        assert_eq!(finalized[0].1.annotations[0].path, ".github/kubevalidator.yaml");
    }

    #[tokio::test]
    async fn test_config_fetch_failure_is_not_reported_as_invalid() {
        let gh = MemoryGitHub::new();
        let run = start_check_run(&gh, &repo(), "abc123").await.expect("start");
        let error = ConfigError::Fetch(ClientError::Transport("connection reset".to_string()));
        run.complete_config_error(&gh, ".github/kubevalidator.yaml", &error)
            .await
            .expect("complete");

        let completion = &gh.finalized()[0].1;
        assert_eq!(completion.title, "Configuration unavailable");
        assert_eq!(completion.annotations[0].title, "Configuration unavailable");
        assert!(!completion.summary.contains("Fix `"));
    }

    #[tokio::test]
    async fn test_start_failure_is_create_error() {
        let gh = MemoryGitHub::new().failing_check_run_creation();
        let err = start_check_run(&gh, &repo(), "abc123").await.unwrap_err();
        assert!(matches!(err, PipelineError::CreateCheckRun(_)));
    }
}
