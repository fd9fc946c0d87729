//! Error types for kubecheck

use thiserror::Error;

/// Failures reported by the hosting-platform collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Non-success HTTP status from the API
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Request never produced a response (DNS, TLS, connection reset...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Requested file does not exist at the given ref
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Reasons a repository configuration could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No configuration file and no service default
    #[error("Configuration file {path} not found")]
    Missing { path: String },

    /// The file exists but is not valid YAML for the config model
    #[error("Failed to parse {path}: {message}")]
    Parse {
        path: String,
        message: String,
        line: Option<usize>,
    },

    /// The file parsed but violates a configuration rule
    #[error("Invalid configuration in {path}: {reason}")]
    Invalid { path: String, reason: String },

    /// A referenced schema could not be loaded or compiled
    #[error("Schema '{name}' could not be loaded: {reason}")]
    Schema { name: String, reason: String },

    /// Transport failure while fetching configuration
    #[error("Failed to fetch configuration: {0}")]
    Fetch(#[from] ClientError),
}

impl ConfigError {
    /// Line in the configuration file the error points at, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ConfigError::Parse { line, .. } => *line,
            _ => None,
        }
    }
}

/// Webhook payload decoding errors
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of the pipeline stages that are not recovered locally
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Couldn't create check run: {0}")]
    CreateCheckRun(#[source] ClientError),

    #[error("Couldn't list changed files for pull request #{number}: {source}")]
    ListChangedFiles {
        number: u64,
        #[source]
        source: ClientError,
    },

    #[error("Couldn't finalize check run {check_run_id}: {source}")]
    FinalizeCheckRun {
        check_run_id: u64,
        #[source]
        source: ClientError,
    },

    #[error("Couldn't request check suite for {head_sha}: {source}")]
    RequestCheckSuite {
        head_sha: String,
        #[source]
        source: ClientError,
    },
}

/// Result type for collaborator calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;
