//! The GitHub seam: one async method per upstream call, and the REST
//! implementation over `reqwest`.
//!
//! Nothing here retries. A side-effecting request that may have reached
//! GitHub before failing is reported as [`GithubError::Indeterminate`].

use crate::config::GithubConfig;
use crate::models::*;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use toolgate_mcp::{ConfigError, ToolError};

const USER_AGENT: &str = concat!("toolgate-github/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const TEXT_MATCH_MEDIA_TYPE: &str = "application/vnd.github.text-match+json";

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-2xx other than 404, with GitHub's `message`.
    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to GitHub failed: {0}")]
    Transport(String),

    /// A write may or may not have been applied.
    #[error("{0}")]
    Indeterminate(String),

    #[error("unexpected response from GitHub: {0}")]
    Decode(String),
}

impl From<GithubError> for ToolError {
    fn from(e: GithubError) -> Self {
        match e {
            GithubError::NotFound(what) => ToolError::NotFound(what),
            GithubError::Indeterminate(message) => ToolError::Indeterminate(message),
            other => ToolError::Upstream(other.to_string()),
        }
    }
}

/// Everything the handlers need from GitHub.
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// `GET /user`, used once at startup to prove the token.
    async fn authenticated_user(&self) -> Result<User, GithubError>;

    async fn search_code(
        &self,
        query: &str,
        per_page: u32,
    ) -> Result<SearchResults<CodeItem>, GithubError>;

    async fn search_repositories(
        &self,
        query: &str,
        sort: &str,
        order: &str,
        per_page: u32,
    ) -> Result<SearchResults<Repository>, GithubError>;

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Repository, GithubError>;

    /// One page of repositories, for `username` or the authenticated user.
    async fn list_user_repos(
        &self,
        username: Option<&str>,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Repository>, GithubError>;

    async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> Result<Contents, GithubError>;

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        query: &ListQuery,
    ) -> Result<Vec<Issue>, GithubError>;

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, GithubError>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GithubError>;

    async fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue, GithubError>;

    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        query: &ListQuery,
    ) -> Result<Vec<PullRequest>, GithubError>;

    async fn get_pull(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GithubError>;

    async fn list_pull_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<ChangedFile>, GithubError>;

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GithubError>;

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Branch>, GithubError>;

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> Result<Commit, GithubError>;

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        query: &CommitQuery,
    ) -> Result<Vec<Commit>, GithubError>;
}

/// Prove the token with `GET /user`. Returns the login.
pub async fn verify(api: &dyn GithubApi) -> Result<String, ConfigError> {
    match api.authenticated_user().await {
        Ok(user) => Ok(user.login),
        Err(e @ GithubError::Api { status: 401, .. }) | Err(e @ GithubError::Api { status: 403, .. }) => {
            Err(ConfigError::CredentialRejected(e.to_string()))
        }
        Err(e) => Err(ConfigError::Unreachable(e.to_string())),
    }
}

/// [`GithubApi`] over the REST API.
///
/// `reqwest::Client` pools connections internally and is shared by every
/// invocation.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &GithubConfig) -> Result<Self, ConfigError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token())).map_err(|_| {
            ConfigError::Invalid {
                name: "GITHUB_TOKEN",
                reason: "contains characters not allowed in an HTTP header".to_string(),
            }
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "GITHUB_API_URL",
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.api_url().to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    fn repo_path(owner: &str, repo: &str) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        )
    }

    /// Send a read. Transport failures are plain upstream errors.
    async fn get<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, GithubError> {
        let response = request
            .send()
            .await
            .map_err(|e| GithubError::Transport(e.to_string()))?;
        let response = check_status(response, what).await?;
        response
            .json()
            .await
            .map_err(|e| GithubError::Decode(e.to_string()))
    }

    /// Send a write. Once the request may have left the process, any failure
    /// to learn the outcome is `Indeterminate`. That includes a 5xx reply:
    /// GitHub may have applied the write before failing. Only a 4xx is a
    /// definite rejection.
    async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        what: &str,
    ) -> Result<T, GithubError> {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    GithubError::Transport(e.to_string())
                } else {
                    GithubError::Indeterminate(format!(
                        "{} may or may not have been applied: {}",
                        what, e
                    ))
                }
            })?;
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Indeterminate(format!(
                "{} may or may not have been applied: GitHub returned {}: {}",
                what,
                status.as_u16(),
                error_message(&body)
            )));
        }
        let response = check_status(response, what).await?;
        response.json().await.map_err(|e| {
            GithubError::Indeterminate(format!(
                "{} succeeded but the response could not be read: {}",
                what, e
            ))
        })
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, GithubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GithubError::NotFound(what.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(GithubError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// GitHub's `message` field, or the raw body when it is not JSON.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl GithubApi for RestClient {
    async fn authenticated_user(&self) -> Result<User, GithubError> {
        self.get(self.request(Method::GET, "/user"), "authenticated user")
            .await
    }

    async fn search_code(
        &self,
        query: &str,
        per_page: u32,
    ) -> Result<SearchResults<CodeItem>, GithubError> {
        let request = self
            .request(Method::GET, "/search/code")
            .header(ACCEPT, TEXT_MATCH_MEDIA_TYPE)
            .query(&[("q", query), ("per_page", per_page.to_string().as_str())]);
        self.get(request, "code search").await
    }

    async fn search_repositories(
        &self,
        query: &str,
        sort: &str,
        order: &str,
        per_page: u32,
    ) -> Result<SearchResults<Repository>, GithubError> {
        let request = self.request(Method::GET, "/search/repositories").query(&[
            ("q", query),
            ("sort", sort),
            ("order", order),
            ("per_page", per_page.to_string().as_str()),
        ]);
        self.get(request, "repository search").await
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Repository, GithubError> {
        let request = self.request(Method::GET, &Self::repo_path(owner, repo));
        self.get(request, &format!("repository {}/{}", owner, repo))
            .await
    }

    async fn list_user_repos(
        &self,
        username: Option<&str>,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Repository>, GithubError> {
        let (path, what) = match username {
            Some(u) => (
                format!("/users/{}/repos", urlencoding::encode(u)),
                format!("user {}", u),
            ),
            None => ("/user/repos".to_string(), "authenticated user".to_string()),
        };
        let request = self.request(Method::GET, &path).query(&[
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("sort", "updated".to_string()),
        ]);
        self.get(request, &what).await
    }

    async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> Result<Contents, GithubError> {
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let url = format!("{}/contents/{}", Self::repo_path(owner, repo), encoded.join("/"));
        let mut request = self.request(Method::GET, &url);
        if let Some(r) = reference {
            request = request.query(&[("ref", r)]);
        }
        let what = match reference {
            Some(r) => format!("{}/{}/{} at {}", owner, repo, path, r),
            None => format!("{}/{}/{}", owner, repo, path),
        };
        self.get(request, &what).await
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        query: &ListQuery,
    ) -> Result<Vec<Issue>, GithubError> {
        let url = format!("{}/issues", Self::repo_path(owner, repo));
        let request = self.request(Method::GET, &url).query(&[
            ("state", query.state.clone()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
            ("per_page", query.per_page.to_string()),
        ]);
        self.get(request, &format!("repository {}/{}", owner, repo))
            .await
    }

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, GithubError> {
        let url = format!("{}/issues/{}", Self::repo_path(owner, repo), number);
        self.get(
            self.request(Method::GET, &url),
            &format!("issue {}/{}#{}", owner, repo, number),
        )
        .await
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GithubError> {
        let url = format!("{}/issues", Self::repo_path(owner, repo));
        self.write(
            Method::POST,
            &url,
            issue,
            &format!("creating issue '{}' in {}/{}", issue.title, owner, repo),
        )
        .await
    }

    async fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue, GithubError> {
        let url = format!("{}/issues/{}", Self::repo_path(owner, repo), number);
        self.write(
            Method::PATCH,
            &url,
            patch,
            &format!("updating issue {}/{}#{}", owner, repo, number),
        )
        .await
    }

    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        query: &ListQuery,
    ) -> Result<Vec<PullRequest>, GithubError> {
        let url = format!("{}/pulls", Self::repo_path(owner, repo));
        let request = self.request(Method::GET, &url).query(&[
            ("state", query.state.clone()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
            ("per_page", query.per_page.to_string()),
        ]);
        self.get(request, &format!("repository {}/{}", owner, repo))
            .await
    }

    async fn get_pull(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GithubError> {
        let url = format!("{}/pulls/{}", Self::repo_path(owner, repo), number);
        self.get(
            self.request(Method::GET, &url),
            &format!("pull request {}/{}#{}", owner, repo, number),
        )
        .await
    }

    async fn list_pull_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<ChangedFile>, GithubError> {
        let url = format!("{}/pulls/{}/files", Self::repo_path(owner, repo), number);
        let request = self
            .request(Method::GET, &url)
            .query(&[("per_page", per_page), ("page", page)]);
        self.get(request, &format!("pull request {}/{}#{}", owner, repo, number))
            .await
    }

    async fn create_pull(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GithubError> {
        let url = format!("{}/pulls", Self::repo_path(owner, repo));
        self.write(
            Method::POST,
            &url,
            pull,
            &format!(
                "creating pull request '{}' ({} -> {}) in {}/{}",
                pull.title, pull.head, pull.base, owner, repo
            ),
        )
        .await
    }

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Branch>, GithubError> {
        let url = format!("{}/branches", Self::repo_path(owner, repo));
        let request = self
            .request(Method::GET, &url)
            .query(&[("per_page", per_page), ("page", page)]);
        self.get(request, &format!("repository {}/{}", owner, repo))
            .await
    }

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> Result<Commit, GithubError> {
        let url = format!(
            "{}/commits/{}",
            Self::repo_path(owner, repo),
            urlencoding::encode(sha)
        );
        self.get(
            self.request(Method::GET, &url),
            &format!("commit {} in {}/{}", sha, owner, repo),
        )
        .await
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        query: &CommitQuery,
    ) -> Result<Vec<Commit>, GithubError> {
        let url = format!("{}/commits", Self::repo_path(owner, repo));
        let mut params = vec![("per_page", query.per_page.to_string())];
        if let Some(sha) = &query.sha {
            params.push(("sha", sha.clone()));
        }
        if let Some(path) = &query.path {
            params.push(("path", path.clone()));
        }
        let request = self.request(Method::GET, &url).query(&params);
        self.get(request, &format!("repository {}/{}", owner, repo))
            .await
    }
}
