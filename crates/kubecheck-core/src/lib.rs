//! kubecheck - Kubernetes manifest validation for pull requests
//!
//! Provides the check-run validation pipeline that:
//! - Classifies repository events (check suites, pull requests)
//! - Resolves the repository's validation configuration
//! - Selects the changed manifests that must be validated
//! - Validates them for well-formedness and against JSON schemas
//! - Reports findings as an annotated check run
//!
//! The hosting platform is reached only through the traits in [`client`];
//! see `kubecheck-github` for the REST implementation and [`fakes`] for tests.

pub mod annotation;
pub mod changeset;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fakes;
pub mod matcher;
pub mod obs;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod validate;

// Re-export key types
pub use annotation::{Annotation, AnnotationLevel, Conclusion, LevelCounts};
pub use changeset::{extract_changed_files, ChangedFile, FileStatus};
pub use client::{CheckRunClient, CheckRunCompletion, CheckRunHandle, RepositoryClient};
pub use config::{
    ConfigSource, Configuration, ManifestConfig, ManifestRule, RepositoryConfigSource,
    Resolution, Schema, DEFAULT_CONFIG_PATH,
};
pub use error::{ClientError, ClientResult, ConfigError, EventError, PipelineError};
pub use event::{
    classify, Action, AssociatedPullRequest, CheckSuiteAction, CheckSuiteEvent, Event,
    PullRequestAction, PullRequestEvent, RepoRef,
};
pub use matcher::{match_candidates, ValidationCandidate};
pub use obs::{PipelineEvent, PipelineObserver, TracingObserver};
pub use pipeline::{Pipeline, DEFAULT_CONCURRENCY};
pub use report::{start_check_run, CompletedRun, InProgressRun, ValidationReport};
pub use telemetry::init_tracing;
pub use validate::validate;
