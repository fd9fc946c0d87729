//! kubecheck-github - GitHub REST transport for kubecheck
//!
//! Provides [`GitHubClient`], which implements both `CheckRunClient` and
//! `RepositoryClient` from `kubecheck-core`. Annotation batching and file
//! list pagination are handled here so the pipeline sees one call each.

pub mod client;
pub mod wire;

pub use client::{GitHubClient, GitHubConfig, DEFAULT_API_URL, DEFAULT_CHECK_NAME};
