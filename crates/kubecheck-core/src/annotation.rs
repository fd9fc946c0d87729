//! Line-addressed findings reported on a check run.

use serde::{Deserialize, Serialize};

/// Severity of an annotation, named the way the checks API names it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

impl AnnotationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationLevel::Notice => "notice",
            AnnotationLevel::Warning => "warning",
            AnnotationLevel::Failure => "failure",
        }
    }
}

impl std::fmt::Display for AnnotationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding attached to a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    /// Repository-relative path of the annotated file.
    pub path: String,

    /// Link to the blob the finding refers to.
    pub blob_href: String,

    /// First line of the finding (1-based).
    pub start_line: usize,

    /// Last line of the finding (1-based, >= `start_line`).
    pub end_line: usize,

    #[serde(rename = "annotation_level")]
    pub level: AnnotationLevel,

    pub title: String,

    pub message: String,
}

impl Annotation {
    /// Single-line finding.
    pub fn new(
        path: impl Into<String>,
        blob_href: impl Into<String>,
        line: usize,
        level: AnnotationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let line = line.max(1);
        Self {
            path: path.into(),
            blob_href: blob_href.into(),
            start_line: line,
            end_line: line,
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn failure(
        path: impl Into<String>,
        blob_href: impl Into<String>,
        line: usize,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(path, blob_href, line, AnnotationLevel::Failure, title, message)
    }

    pub fn notice(
        path: impl Into<String>,
        blob_href: impl Into<String>,
        line: usize,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(path, blob_href, line, AnnotationLevel::Notice, title, message)
    }

    pub fn is_failure(&self) -> bool {
        self.level == AnnotationLevel::Failure
    }
}

/// Final verdict of a completed check run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
}

impl Conclusion {
    /// Failure iff any annotation has failure severity.
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        if annotations.iter().any(Annotation::is_failure) {
            Conclusion::Failure
        } else {
            Conclusion::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
        }
    }
}

/// Per-level counts used in report titles and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub notices: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl LevelCounts {
    pub fn tally(annotations: &[Annotation]) -> Self {
        annotations
            .iter()
            .fold(Self::default(), |mut counts, a| {
                match a.level {
                    AnnotationLevel::Notice => counts.notices += 1,
                    AnnotationLevel::Warning => counts.warnings += 1,
                    AnnotationLevel::Failure => counts.failures += 1,
                }
                counts
            })
    }
}
