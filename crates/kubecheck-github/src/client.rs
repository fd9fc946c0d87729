//! GitHub REST client
//!
//! Implements the kubecheck collaborator traits against the GitHub v3 API:
//! check runs, check suites, pull request files and raw file contents.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, Url};
use tracing::{debug, info};

use kubecheck_core::{
    ChangedFile, CheckRunClient, CheckRunCompletion, CheckRunHandle, ClientError, ClientResult,
    RepoRef, RepositoryClient,
};

use crate::wire::{
    completion_updates, has_next_page, ApiMessage, CheckRunCreated, CreateCheckRun,
    CreateCheckSuite, PullRequestFile, FILES_PER_PAGE,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_CHECK_NAME: &str = "kubevalidator";

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// GitHub client configuration
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST API root, e.g. `https://github.example.com/api/v3` for GHES
    pub api_url: String,
    /// Token sent as a bearer credential (optional for public reads)
    pub token: Option<String>,
    /// Name shown for created check runs
    pub check_name: String,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            check_name: DEFAULT_CHECK_NAME.to_string(),
            user_agent: format!("kubecheck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GitHubConfig {
    /// Create config for a specific API root
    pub fn new(api_url: &str) -> Self {
        GitHubConfig {
            api_url: api_url.to_string(),
            ..Default::default()
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_check_name(mut self, name: &str) -> Self {
        self.check_name = name.to_string();
        self
    }
}

/// GitHub client for check runs and repository reads
pub struct GitHubClient {
    config: GitHubConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: GitHubConfig) -> ClientResult<Self> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| ClientError::Transport(format!("invalid API URL {}: {}", config.api_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Transport(format!(
                "invalid API URL {}",
                config.api_url
            )));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(transport_error)?;

        Ok(GitHubClient {
            config,
            base,
            http_client,
        })
    }

    /// Build `<api_url>/repos/{owner}/{repo}/<segments...>`, percent-encoding each segment.
    pub fn repo_endpoint<'a>(
        &self,
        repo: &RepoRef,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
                .extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_as(method, url, JSON_MEDIA_TYPE)
    }

    fn request_as(&self, method: Method, url: Url, media_type: &'static str) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header(ACCEPT, media_type)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and turn non-success statuses into `ClientError::Http`.
    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        ClientError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        ClientError::Transport(err.to_string())
    }
}

async fn status_error(response: Response) -> ClientError {
    let status = response.status();
    let message = match response.json::<ApiMessage>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    ClientError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CheckRunClient for GitHubClient {
    async fn create_check_run(
        &self,
        repo: &RepoRef,
        head_sha: &str,
    ) -> ClientResult<CheckRunHandle> {
        let body = CreateCheckRun::in_progress(&self.config.check_name, head_sha, Utc::now());
        let url = self.repo_endpoint(repo, ["check-runs"]);
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        let created: CheckRunCreated = response.json().await.map_err(transport_error)?;

        info!(repo = %repo, check_run_id = created.id, head_sha, "Created check run");
        Ok(CheckRunHandle {
            id: created.id,
            repo: repo.clone(),
            head_sha: head_sha.to_string(),
        })
    }

    async fn finalize_check_run(
        &self,
        handle: &CheckRunHandle,
        completion: CheckRunCompletion,
    ) -> ClientResult<()> {
        let id = handle.id.to_string();
        let url = self.repo_endpoint(&handle.repo, ["check-runs", id.as_str()]);
        let updates = completion_updates(&completion, Utc::now());
        let batches = updates.len();

        for (i, update) in updates.iter().enumerate() {
            debug!(
                check_run_id = handle.id,
                batch = i + 1,
                batches,
                annotations = update.output.annotations.len(),
                "Updating check run"
            );
            self.send(self.request(Method::PATCH, url.clone()).json(update))
                .await?;
        }
        Ok(())
    }

    async fn request_check_suite(&self, repo: &RepoRef, head_sha: &str) -> ClientResult<()> {
        let url = self.repo_endpoint(repo, ["check-suites"]);
        self.send(
            self.request(Method::POST, url)
                .json(&CreateCheckSuite { head_sha }),
        )
        .await?;
        info!(repo = %repo, head_sha, "Requested check suite");
        Ok(())
    }
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        pull_request: u64,
    ) -> ClientResult<Vec<ChangedFile>> {
        let number = pull_request.to_string();
        let url = self.repo_endpoint(repo, ["pulls", number.as_str(), "files"]);
        let per_page = FILES_PER_PAGE.to_string();

        let mut files = Vec::new();
        let mut page = 1usize;
        loop {
            let page_number = page.to_string();
            let request = self.request(Method::GET, url.clone()).query(&[
                ("per_page", per_page.as_str()),
                ("page", page_number.as_str()),
            ]);
            let batch: Vec<PullRequestFile> = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(transport_error)?;
            let len = batch.len();
            files.extend(batch.into_iter().map(ChangedFile::from));
            if !has_next_page(len, page) {
                break;
            }
            page += 1;
        }

        debug!(repo = %repo, pull_request, files = files.len(), pages = page, "Listed pull request files");
        Ok(files)
    }

    async fn fetch_file_content(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
    ) -> ClientResult<Vec<u8>> {
        let url = self.repo_endpoint(repo, std::iter::once("contents").chain(path.split('/')));
        let request = self
            .request_as(Method::GET, url, RAW_MEDIA_TYPE)
            .query(&[("ref", git_ref)]);

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(ClientError::Http { status: 404, .. }) => {
                return Err(ClientError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(repo = %repo, git_ref, path, bytes = bytes.len(), "Fetched file");
        Ok(bytes.to_vec())
    }
}
