//! GitHub tool handlers.
//!
//! Each handler validates nothing itself beyond what its descriptor cannot
//! express, makes its upstream call(s) through [`GithubApi`] and shapes the
//! JSON the host sees.
//!
//! [`GithubApi`]: crate::client::GithubApi

use crate::client::GithubError;
use crate::context::GithubContext;
use crate::ledger::WriteKey;
use crate::models::*;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use toolgate_mcp::{ParamSpec, Params, ToolDescriptor, ToolError, ToolHandler, ValidationError};

const OWNER_PATTERN: &str = r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$";
const REPO_PATTERN: &str = r"^[A-Za-z0-9._-]+$";

const LIST_STATES: &[&str] = &["open", "closed", "all"];
const ISSUE_STATES: &[&str] = &["open", "closed"];
const REPO_SORTS: &[&str] = &["stars", "forks", "updated"];
const ORDERS: &[&str] = &["asc", "desc"];

const CODE_SEARCH_PAGE: u32 = 30;
const PAGE: u32 = 100;
/// GitHub lists at most this many files for one pull request.
const MAX_PULL_FILES: usize = 3000;

fn owner() -> ParamSpec {
    ParamSpec::string("owner")
        .required()
        .pattern(OWNER_PATTERN)
        .describe("Repository owner (user or organization)")
}

fn repo() -> ParamSpec {
    ParamSpec::string("repo")
        .required()
        .pattern(REPO_PATTERN)
        .describe("Repository name")
}

fn number(what: &'static str) -> ParamSpec {
    ParamSpec::integer("number").required().describe(what)
}

fn list_state() -> ParamSpec {
    ParamSpec::one_of("state", LIST_STATES)
        .default_value("open")
        .describe("open, closed or all")
}

fn limit(default: i64, max: i64, description: &'static str) -> ParamSpec {
    ParamSpec::integer("limit")
        .default_value(default)
        .clamp(1, max)
        .describe(description)
}

fn acknowledge() -> ParamSpec {
    ParamSpec::boolean("acknowledge_possible_duplicate")
        .default_value(false)
        .describe(
            "Set to true to send the request even though an identical earlier call \
             ended with an unknown outcome",
        )
}

fn positive(field: &'static str, n: i64) -> Result<u64, ToolError> {
    u64::try_from(n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ValidationError::field(field, "must be a positive integer").into())
}

fn login(user: &Option<User>) -> &str {
    user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown")
}

fn label_names(labels: &[Label]) -> Vec<&str> {
    labels.iter().map(|l| l.name.as_str()).collect()
}

pub(crate) fn repo_json(r: &Repository) -> Value {
    json!({
        "name": r.name,
        "full_name": r.full_name,
        "description": r.description,
        "language": r.language,
        "private": r.private,
        "stars": r.stargazers_count,
        "forks": r.forks_count,
        "open_issues": r.open_issues_count,
        "default_branch": r.default_branch,
        "html_url": r.html_url,
        "created_at": r.created_at,
        "updated_at": r.updated_at,
    })
}

pub(crate) fn issue_json(i: &Issue) -> Value {
    json!({
        "number": i.number,
        "title": i.title,
        "body": i.body,
        "state": i.state,
        "labels": label_names(&i.labels),
        "user": login(&i.user),
        "created_at": i.created_at,
        "updated_at": i.updated_at,
        "html_url": i.html_url,
    })
}

fn pull_json(p: &PullRequest) -> Value {
    json!({
        "number": p.number,
        "title": p.title,
        "body": p.body,
        "state": p.state,
        "user": login(&p.user),
        "head": p.head.name,
        "base": p.base.name,
        "draft": p.draft,
        "created_at": p.created_at,
        "updated_at": p.updated_at,
        "html_url": p.html_url,
    })
}

fn actor_json(actor: &Option<GitActor>) -> Value {
    match actor {
        Some(a) => json!({ "name": a.name, "email": a.email, "date": a.date }),
        None => Value::Null,
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

/// Fetch numbered pages of [`PAGE`] items until `limit` items are collected
/// or a short page marks the end.
async fn collect_pages<T, F, Fut>(limit: usize, mut fetch: F) -> Result<Vec<T>, GithubError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<T>, GithubError>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    while items.len() < limit {
        let batch = fetch(page).await?;
        let last = batch.len() < PAGE as usize;
        items.extend(batch);
        if last {
            break;
        }
        page += 1;
    }
    items.truncate(limit);
    Ok(items)
}

// ---------------------------------------------------------------------------
// search_code
// ---------------------------------------------------------------------------

pub fn search_code_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "search_code",
        "Search code on GitHub using GitHub search syntax, e.g. 'language:rust fn main' or \
         'repo:owner/repo filename:Cargo.toml'. Returns at most 30 matches.",
    )
    .param(
        ParamSpec::string("query")
            .required()
            .non_empty()
            .describe("GitHub code search query"),
    )
}

pub struct SearchCode;

#[async_trait]
impl ToolHandler<GithubContext> for SearchCode {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let query = params.str("query").unwrap_or_default();
        let results = ctx.api().search_code(query, CODE_SEARCH_PAGE).await?;

        let items: Vec<Value> = results
            .items
            .iter()
            .take(CODE_SEARCH_PAGE as usize)
            .map(|item| {
                let fragment = item.text_matches.iter().find_map(|m| m.fragment.clone());
                json!({
                    "name": item.name,
                    "path": item.path,
                    "repository": {
                        "full_name": item.repository.full_name,
                        "html_url": item.repository.html_url,
                    },
                    "html_url": item.html_url,
                    "sha": item.sha,
                    "fragment": fragment,
                })
            })
            .collect();

        Ok(json!({
            "total_count": results.total_count,
            "incomplete_results": results.incomplete_results,
            "items": items,
        }))
    }
}

// ---------------------------------------------------------------------------
// get_repo_info
// ---------------------------------------------------------------------------

pub fn get_repo_info_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_repo_info",
        "Get repository details: description, language, stars, forks, open issues, default branch.",
    )
    .param(owner())
    .param(repo())
}

pub(crate) async fn repo_info(
    ctx: &GithubContext,
    owner: &str,
    repo: &str,
) -> Result<Value, ToolError> {
    let repository = ctx.api().get_repo(owner, repo).await?;
    Ok(repo_json(&repository))
}

pub struct GetRepoInfo;

#[async_trait]
impl ToolHandler<GithubContext> for GetRepoInfo {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        repo_info(
            ctx,
            params.str("owner").unwrap_or_default(),
            params.str("repo").unwrap_or_default(),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// get_file_content
// ---------------------------------------------------------------------------

pub fn get_file_content_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_file_content",
        "Read one file from a repository. Directories are rejected.",
    )
    .param(owner())
    .param(repo())
    .param(
        ParamSpec::string("path")
            .required()
            .non_empty()
            .describe("File path relative to the repository root"),
    )
    .param(
        ParamSpec::string("ref")
            .non_empty()
            .describe("Branch, tag or commit SHA (default: the default branch)"),
    )
}

/// Decoded text of a file entry, or a placeholder when it has none.
fn decode_content(entry: &ContentEntry) -> String {
    let Some(raw) = entry.content.as_deref() else {
        return format!(
            "[content not inlined by GitHub ({} bytes); see html_url]",
            entry.size
        );
    };
    match entry.encoding.as_deref() {
        Some("base64") => {
            let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            match STANDARD.decode(compact) {
                Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| {
                    format!("[binary file ({} bytes) not shown]", entry.size)
                }),
                Err(e) => {
                    tracing::debug!(path = %entry.path, error = %e, "content is not valid base64");
                    format!("[undecodable content ({} bytes) not shown]", entry.size)
                }
            }
        }
        Some("none") | Some("") => format!(
            "[file too large to inline ({} bytes); see html_url]",
            entry.size
        ),
        _ => raw.to_string(),
    }
}

pub(crate) async fn file_content(
    ctx: &GithubContext,
    owner: &str,
    repo: &str,
    path: &str,
    reference: Option<&str>,
) -> Result<Value, ToolError> {
    let entry = match ctx.api().get_contents(owner, repo, path, reference).await? {
        Contents::Entry(entry) if entry.kind == "file" => entry,
        Contents::Entry(entry) => {
            tracing::debug!(path = %path, kind = %entry.kind, "path is not a regular file");
            return Err(ToolError::AmbiguousPath {
                path: path.to_string(),
            });
        }
        Contents::Directory(_) => {
            return Err(ToolError::AmbiguousPath {
                path: path.to_string(),
            });
        }
    };

    Ok(json!({
        "path": entry.path,
        "content": decode_content(&entry),
        "encoding": entry.encoding.as_deref().unwrap_or("base64"),
        "size": entry.size,
        "sha": entry.sha,
        "html_url": entry.html_url,
    }))
}

pub struct GetFileContent;

#[async_trait]
impl ToolHandler<GithubContext> for GetFileContent {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        file_content(
            ctx,
            params.str("owner").unwrap_or_default(),
            params.str("repo").unwrap_or_default(),
            params.str("path").unwrap_or_default(),
            params.str("ref"),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// list_issues / list_pull_requests
// ---------------------------------------------------------------------------

pub fn list_issues_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_issues",
        "List issues of a repository, most recently updated first. Pull requests are excluded.",
    )
    .param(owner())
    .param(repo())
    .param(list_state())
    .param(limit(10, 100, "Maximum number of issues (1-100, default 10)"))
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    owner: String,
    repo: String,
    state: String,
    limit: u32,
}

impl ListArgs {
    fn query(&self) -> ListQuery {
        ListQuery {
            state: self.state.clone(),
            per_page: self.limit,
        }
    }
}

pub struct ListIssues;

#[async_trait]
impl ToolHandler<GithubContext> for ListIssues {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: ListArgs = params.into_typed()?;
        let issues = ctx
            .api()
            .list_issues(&args.owner, &args.repo, &args.query())
            .await?;

        let items: Vec<Value> = issues
            .iter()
            .filter(|i| !i.is_pull_request())
            .take(args.limit as usize)
            .map(issue_json)
            .collect();
        Ok(json!({ "count": items.len(), "issues": items }))
    }
}

pub fn list_pull_requests_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_pull_requests",
        "List pull requests of a repository, most recently updated first.",
    )
    .param(owner())
    .param(repo())
    .param(list_state())
    .param(limit(10, 100, "Maximum number of pull requests (1-100, default 10)"))
}

pub struct ListPullRequests;

#[async_trait]
impl ToolHandler<GithubContext> for ListPullRequests {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: ListArgs = params.into_typed()?;
        let pulls = ctx
            .api()
            .list_pulls(&args.owner, &args.repo, &args.query())
            .await?;

        let items: Vec<Value> = pulls
            .iter()
            .take(args.limit as usize)
            .map(pull_json)
            .collect();
        Ok(json!({ "count": items.len(), "pull_requests": items }))
    }
}

// ---------------------------------------------------------------------------
// Side-effecting creates
// ---------------------------------------------------------------------------

/// Run one side-effecting call under a pending-write mark.
///
/// The mark is taken before `call` is first polled, so an identical write
/// whose outcome is still unknown is refused without reaching GitHub.
async fn guarded_write<T, F>(
    ctx: &GithubContext,
    key: WriteKey,
    acknowledged: bool,
    call: F,
) -> Result<T, ToolError>
where
    F: std::future::Future<Output = Result<T, GithubError>>,
{
    let guard = ctx
        .pending()
        .try_begin(key, acknowledged)
        .map_err(|dup| ToolError::Indeterminate(dup.to_string()))?;
    match call.await {
        Ok(value) => {
            guard.settle();
            Ok(value)
        }
        Err(GithubError::Indeterminate(message)) => {
            guard.keep();
            Err(ToolError::Indeterminate(message))
        }
        Err(e) => {
            guard.settle();
            tracing::error!(error = %e, "write rejected by GitHub");
            Err(e.into())
        }
    }
}

pub fn create_issue_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "create_issue",
        "Create an issue. Never retried; if the outcome is unknown the call reports it and \
         identical calls are refused until acknowledged.",
    )
    .param(owner())
    .param(repo())
    .param(
        ParamSpec::string("title")
            .required()
            .non_empty()
            .describe("Issue title"),
    )
    .param(
        ParamSpec::string("body")
            .default_value("")
            .describe("Issue body (Markdown)"),
    )
    .param(
        ParamSpec::string_list("labels")
            .default_value(json!([]))
            .describe("Label names"),
    )
    .param(acknowledge())
    .side_effecting()
}

#[derive(Debug, Deserialize)]
struct CreateIssueArgs {
    owner: String,
    repo: String,
    title: String,
    body: String,
    labels: Vec<String>,
    acknowledge_possible_duplicate: bool,
}

pub struct CreateIssue;

#[async_trait]
impl ToolHandler<GithubContext> for CreateIssue {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: CreateIssueArgs = params.into_typed()?;
        let key = WriteKey::new("create_issue", &args.owner, &args.repo, &args.title);

        let new_issue = NewIssue {
            title: args.title,
            body: args.body,
            labels: args.labels,
        };
        let issue = guarded_write(
            ctx,
            key,
            args.acknowledge_possible_duplicate,
            ctx.api().create_issue(&args.owner, &args.repo, &new_issue),
        )
        .await?;

        tracing::info!(
            owner = %args.owner,
            repo = %args.repo,
            number = issue.number,
            "issue created"
        );
        Ok(issue_json(&issue))
    }
}

pub fn create_pull_request_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "create_pull_request",
        "Open a pull request from head into base. Never retried; an unknown outcome is \
         reported and identical calls are refused until acknowledged.",
    )
    .param(owner())
    .param(repo())
    .param(ParamSpec::string("title").required().non_empty().describe("Pull request title"))
    .param(ParamSpec::string("head").required().non_empty().describe("Source branch"))
    .param(ParamSpec::string("base").required().non_empty().describe("Target branch"))
    .param(
        ParamSpec::string("body")
            .default_value("")
            .describe("Pull request description (Markdown)"),
    )
    .param(
        ParamSpec::boolean("draft")
            .default_value(false)
            .describe("Open as a draft"),
    )
    .param(acknowledge())
    .side_effecting()
}

#[derive(Debug, Deserialize)]
struct CreatePullArgs {
    owner: String,
    repo: String,
    title: String,
    head: String,
    base: String,
    body: String,
    draft: bool,
    acknowledge_possible_duplicate: bool,
}

pub struct CreatePullRequest;

#[async_trait]
impl ToolHandler<GithubContext> for CreatePullRequest {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: CreatePullArgs = params.into_typed()?;
        let key = WriteKey::new(
            "create_pull_request",
            &args.owner,
            &args.repo,
            format!("{} ({} -> {})", args.title, args.head, args.base),
        );

        let new_pull = NewPullRequest {
            title: args.title,
            head: args.head,
            base: args.base,
            body: args.body,
            draft: args.draft,
        };
        let pull = guarded_write(
            ctx,
            key,
            args.acknowledge_possible_duplicate,
            ctx.api().create_pull(&args.owner, &args.repo, &new_pull),
        )
        .await?;

        tracing::info!(
            owner = %args.owner,
            repo = %args.repo,
            number = pull.number,
            "pull request created"
        );
        Ok(pull_json(&pull))
    }
}

// ---------------------------------------------------------------------------
// Single issue / pull request
// ---------------------------------------------------------------------------

pub(crate) async fn issue_detail(
    ctx: &GithubContext,
    owner: &str,
    repo: &str,
    number: u64,
) -> Result<Value, ToolError> {
    let issue = ctx.api().get_issue(owner, repo, number).await?;
    Ok(issue_json(&issue))
}

pub fn get_pull_request_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_pull_request",
        "Get one pull request with its merge state and changed files.",
    )
    .param(owner())
    .param(repo())
    .param(number("Pull request number"))
}

pub struct GetPullRequest;

#[async_trait]
impl ToolHandler<GithubContext> for GetPullRequest {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let owner = params.str("owner").unwrap_or_default();
        let repo = params.str("repo").unwrap_or_default();
        let number = positive("number", params.i64("number").unwrap_or_default())?;

        let api = ctx.api();
        let pull = api.get_pull(owner, repo, number).await?;
        let files = collect_pages(MAX_PULL_FILES, move |page| {
            api.list_pull_files(owner, repo, number, PAGE, page)
        })
        .await?;

        let mut result = pull_json(&pull);
        result["merged"] = json!(pull.merged);
        result["mergeable"] = json!(pull.mergeable);
        result["comments"] = json!(pull.comments);
        result["additions"] = json!(pull.additions);
        result["deletions"] = json!(pull.deletions);
        result["merged_at"] = json!(pull.merged_at);
        result["changed_files_count"] = json!(files.len());
        result["changed_files"] = json!(files);
        Ok(result)
    }
}

pub fn update_issue_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "update_issue",
        "Change an issue's state, title, body or labels. Only the given fields are changed.",
    )
    .param(owner())
    .param(repo())
    .param(number("Issue number"))
    .param(ParamSpec::one_of("state", ISSUE_STATES).describe("open or closed"))
    .param(ParamSpec::string("title").non_empty().describe("New title"))
    .param(ParamSpec::string("body").describe("New body (Markdown)"))
    .param(ParamSpec::string_list("labels").describe("Replacement label names"))
    .side_effecting()
}

#[derive(Debug, Deserialize)]
struct UpdateIssueArgs {
    owner: String,
    repo: String,
    number: i64,
    state: Option<String>,
    title: Option<String>,
    body: Option<String>,
    labels: Option<Vec<String>>,
}

pub struct UpdateIssue;

#[async_trait]
impl ToolHandler<GithubContext> for UpdateIssue {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: UpdateIssueArgs = params.into_typed()?;
        let number = positive("number", args.number)?;
        let patch = IssuePatch {
            state: args.state,
            title: args.title,
            body: args.body,
            labels: args.labels,
        };
        if patch.is_empty() {
            return Err(ValidationError::field(
                "state",
                "at least one of state, title, body or labels is required",
            )
            .into());
        }

        // PATCH sets fields to given values, so a repeat converges.
        let issue = ctx
            .api()
            .update_issue(&args.owner, &args.repo, number, &patch)
            .await?;
        tracing::info!(owner = %args.owner, repo = %args.repo, number, "issue updated");
        Ok(issue_json(&issue))
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

pub fn list_user_repos_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_user_repos",
        "List a user's repositories, or the authenticated user's when no username is given.",
    )
    .param(
        ParamSpec::string("username")
            .pattern(OWNER_PATTERN)
            .describe("GitHub username (default: the authenticated user)"),
    )
    .param(limit(100, 1000, "Maximum number of repositories (1-1000, default 100)"))
}

pub struct ListUserRepos;

#[async_trait]
impl ToolHandler<GithubContext> for ListUserRepos {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let username = params.str("username");
        let limit = params.i64("limit").unwrap_or(100).max(1) as usize;

        let api = ctx.api();
        let repos = collect_pages(limit, move |page| {
            api.list_user_repos(username, PAGE, page)
        })
        .await?;

        let user = match username {
            Some(u) => u.to_string(),
            None => ctx.api().authenticated_user().await?.login,
        };
        let private_count = repos.iter().filter(|r| r.private).count();
        tracing::debug!(user = %user, count = repos.len(), "listed repositories");

        Ok(json!({
            "user": user,
            "total_count": repos.len(),
            "public_count": repos.len() - private_count,
            "private_count": private_count,
            "repos": repos.iter().map(repo_json).collect::<Vec<_>>(),
        }))
    }
}

pub fn search_repositories_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "search_repositories",
        "Search repositories using GitHub search syntax, e.g. 'language:rust stars:>1000'.",
    )
    .param(
        ParamSpec::string("query")
            .required()
            .non_empty()
            .describe("GitHub repository search query"),
    )
    .param(
        ParamSpec::one_of("sort", REPO_SORTS)
            .default_value("stars")
            .describe("stars, forks or updated"),
    )
    .param(
        ParamSpec::one_of("order", ORDERS)
            .default_value("desc")
            .describe("asc or desc"),
    )
    .param(limit(30, 100, "Maximum number of repositories (1-100, default 30)"))
}

#[derive(Debug, Deserialize)]
struct SearchReposArgs {
    query: String,
    sort: String,
    order: String,
    limit: u32,
}

pub struct SearchRepositories;

#[async_trait]
impl ToolHandler<GithubContext> for SearchRepositories {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: SearchReposArgs = params.into_typed()?;
        let results = ctx
            .api()
            .search_repositories(&args.query, &args.sort, &args.order, args.limit)
            .await?;
        let items: Vec<Value> = results
            .items
            .iter()
            .take(args.limit as usize)
            .map(repo_json)
            .collect();
        Ok(json!({ "total_count": results.total_count, "items": items }))
    }
}

pub fn list_branches_descriptor() -> ToolDescriptor {
    ToolDescriptor::new("list_branches", "List branches of a repository.")
        .param(owner())
        .param(repo())
        .param(limit(100, 1000, "Maximum number of branches (1-1000, default 100)"))
}

pub struct ListBranches;

#[async_trait]
impl ToolHandler<GithubContext> for ListBranches {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let owner = params.str("owner").unwrap_or_default();
        let repo = params.str("repo").unwrap_or_default();
        let limit = params.i64("limit").unwrap_or(100).max(1) as usize;

        let api = ctx.api();
        let branches = collect_pages(limit, move |page| {
            api.list_branches(owner, repo, PAGE, page)
        })
        .await?;
        let items: Vec<Value> = branches
            .iter()
            .map(|b| {
                json!({
                    "name": b.name,
                    "sha": b.commit.sha,
                    "protected": b.protected,
                    "html_url": b.links.as_ref().and_then(|l| l.html.clone()),
                })
            })
            .collect();
        Ok(json!({ "count": items.len(), "branches": items }))
    }
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

pub fn get_commit_info_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_commit_info",
        "Get one commit: message, author, committer, stats and changed files.",
    )
    .param(owner())
    .param(repo())
    .param(
        ParamSpec::string("sha")
            .required()
            .non_empty()
            .describe("Commit SHA, branch or tag"),
    )
}

pub struct GetCommitInfo;

#[async_trait]
impl ToolHandler<GithubContext> for GetCommitInfo {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let owner = params.str("owner").unwrap_or_default();
        let repo = params.str("repo").unwrap_or_default();
        let sha = params.str("sha").unwrap_or_default();

        let commit = ctx.api().get_commit(owner, repo, sha).await?;
        Ok(json!({
            "sha": commit.sha,
            "message": commit.commit.message,
            "author": actor_json(&commit.commit.author),
            "committer": actor_json(&commit.commit.committer),
            "stats": commit.stats,
            "changed_files_count": commit.files.len(),
            "changed_files": commit.files,
            "html_url": commit.html_url,
        }))
    }
}

pub fn list_commits_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_commits",
        "List commits, newest first, optionally from a branch/SHA or touching a path.",
    )
    .param(owner())
    .param(repo())
    .param(
        ParamSpec::string("sha")
            .non_empty()
            .describe("Branch or SHA to start from (default: the default branch)"),
    )
    .param(
        ParamSpec::string("path")
            .non_empty()
            .describe("Only commits touching this path"),
    )
    .param(limit(30, 100, "Maximum number of commits (1-100, default 30)"))
}

#[derive(Debug, Deserialize)]
struct ListCommitsArgs {
    owner: String,
    repo: String,
    sha: Option<String>,
    path: Option<String>,
    limit: u32,
}

pub struct ListCommits;

#[async_trait]
impl ToolHandler<GithubContext> for ListCommits {
    async fn call(&self, ctx: &GithubContext, params: Params) -> Result<Value, ToolError> {
        let args: ListCommitsArgs = params.into_typed()?;
        let query = CommitQuery {
            sha: args.sha,
            path: args.path,
            per_page: args.limit,
        };
        let commits = ctx
            .api()
            .list_commits(&args.owner, &args.repo, &query)
            .await?;

        let items: Vec<Value> = commits
            .iter()
            .take(args.limit as usize)
            .map(|c| {
                json!({
                    "sha": c.sha,
                    "message": first_line(&c.commit.message),
                    "author": actor_json(&c.commit.author),
                    "committer": actor_json(&c.commit.committer),
                    "html_url": c.html_url,
                })
            })
            .collect();
        Ok(json!({ "count": items.len(), "commits": items }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::GithubApi;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use toolgate_mcp::{Dispatcher, ErrorKind};

    /// In-memory GitHub that records every call it receives.
    #[derive(Default)]
    pub(crate) struct FakeGithub {
        pub calls: Mutex<Vec<String>>,
        pub created: Mutex<Vec<NewIssue>>,
        pub contents: Mutex<Option<Contents>>,
        /// Never answer create calls.
        pub hang_on_create: bool,
        pub repo_pages: usize,
        pub branch_pages: usize,
        /// Full pages of pull request files before the final one-file page.
        pub pull_file_pages: usize,
    }

    impl FakeGithub {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn repository(name: &str, private: bool) -> Repository {
        Repository {
            name: name.to_string(),
            full_name: format!("octo/{}", name),
            private,
            html_url: format!("https://github.com/octo/{}", name),
            ..Default::default()
        }
    }

    fn issue(number: u64, pull_request: bool) -> Issue {
        Issue {
            number,
            title: format!("issue {}", number),
            state: "open".into(),
            html_url: format!("https://github.com/octo/hello/issues/{}", number),
            pull_request: pull_request.then(|| json!({})),
            ..Default::default()
        }
    }

    #[async_trait]
    impl GithubApi for FakeGithub {
        async fn authenticated_user(&self) -> Result<User, GithubError> {
            self.record("GET /user");
            Ok(User {
                login: "octocat".into(),
            })
        }

        async fn search_code(
            &self,
            query: &str,
            per_page: u32,
        ) -> Result<SearchResults<CodeItem>, GithubError> {
            self.record(format!("search_code {} {}", query, per_page));
            Ok(SearchResults {
                total_count: 0,
                incomplete_results: false,
                items: Vec::new(),
            })
        }

        async fn search_repositories(
            &self,
            query: &str,
            sort: &str,
            order: &str,
            per_page: u32,
        ) -> Result<SearchResults<Repository>, GithubError> {
            self.record(format!("search_repositories {} {} {} {}", query, sort, order, per_page));
            Ok(SearchResults {
                total_count: 1,
                incomplete_results: false,
                items: vec![repository("hello", false)],
            })
        }

        async fn get_repo(&self, owner: &str, repo: &str) -> Result<Repository, GithubError> {
            self.record(format!("get_repo {}/{}", owner, repo));
            if repo == "missing" {
                return Err(GithubError::NotFound(format!("repository {}/{}", owner, repo)));
            }
            Ok(repository(repo, false))
        }

        async fn list_user_repos(
            &self,
            username: Option<&str>,
            per_page: u32,
            page: u32,
        ) -> Result<Vec<Repository>, GithubError> {
            self.record(format!("list_user_repos {:?} {} {}", username, per_page, page));
            if page as usize > self.repo_pages {
                return Ok(Vec::new());
            }
            Ok((0..per_page)
                .map(|i| repository(&format!("r{}-{}", page, i), i % 10 == 0))
                .collect())
        }

        async fn get_contents(
            &self,
            owner: &str,
            repo: &str,
            path: &str,
            reference: Option<&str>,
        ) -> Result<Contents, GithubError> {
            self.record(format!("get_contents {}/{}/{} {:?}", owner, repo, path, reference));
            self.contents
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| GithubError::NotFound(path.to_string()))
        }

        async fn list_issues(
            &self,
            owner: &str,
            repo: &str,
            query: &ListQuery,
        ) -> Result<Vec<Issue>, GithubError> {
            self.record(format!(
                "list_issues {}/{} {} {}",
                owner, repo, query.state, query.per_page
            ));
            Ok(vec![issue(1, false), issue(2, true), issue(3, false)])
        }

        async fn get_issue(
            &self,
            owner: &str,
            repo: &str,
            number: u64,
        ) -> Result<Issue, GithubError> {
            self.record(format!("get_issue {}/{}#{}", owner, repo, number));
            if number == 404 {
                return Err(GithubError::NotFound(format!("issue #{}", number)));
            }
            Ok(issue(number, false))
        }

        async fn create_issue(
            &self,
            owner: &str,
            repo: &str,
            new_issue: &NewIssue,
        ) -> Result<Issue, GithubError> {
            self.record(format!("create_issue {}/{}", owner, repo));
            if self.hang_on_create {
                std::future::pending::<()>().await;
            }
            self.created.lock().unwrap().push(new_issue.clone());
            Ok(Issue {
                number: 42,
                title: new_issue.title.clone(),
                body: Some(new_issue.body.clone()),
                state: "open".into(),
                labels: new_issue
                    .labels
                    .iter()
                    .map(|n| Label { name: n.clone() })
                    .collect(),
                html_url: "https://github.com/octo/hello/issues/42".into(),
                ..Default::default()
            })
        }

        async fn update_issue(
            &self,
            owner: &str,
            repo: &str,
            number: u64,
            patch: &IssuePatch,
        ) -> Result<Issue, GithubError> {
            self.record(format!(
                "update_issue {}/{}#{} {}",
                owner,
                repo,
                number,
                serde_json::to_string(patch).unwrap()
            ));
            let mut updated = issue(number, false);
            if let Some(state) = &patch.state {
                updated.state = state.clone();
            }
            Ok(updated)
        }

        async fn list_pulls(
            &self,
            owner: &str,
            repo: &str,
            query: &ListQuery,
        ) -> Result<Vec<PullRequest>, GithubError> {
            self.record(format!(
                "list_pulls {}/{} {} {}",
                owner, repo, query.state, query.per_page
            ));
            Ok(Vec::new())
        }

        async fn get_pull(
            &self,
            _owner: &str,
            _repo: &str,
            number: u64,
        ) -> Result<PullRequest, GithubError> {
            self.record(format!("get_pull #{}", number));
            Ok(PullRequest {
                number,
                title: "Add feature".into(),
                state: "open".into(),
                head: GitRef {
                    name: "feature".into(),
                },
                base: GitRef {
                    name: "main".into(),
                },
                merged: Some(false),
                html_url: format!("https://github.com/octo/hello/pull/{}", number),
                ..Default::default()
            })
        }

        async fn list_pull_files(
            &self,
            _owner: &str,
            _repo: &str,
            number: u64,
            per_page: u32,
            page: u32,
        ) -> Result<Vec<ChangedFile>, GithubError> {
            self.record(format!("list_pull_files #{} {} {}", number, per_page, page));
            let file = |name: String| ChangedFile {
                filename: name,
                status: "modified".into(),
                additions: 3,
                deletions: 1,
                changes: 4,
            };
            let page = page as usize;
            Ok(match page.cmp(&(self.pull_file_pages + 1)) {
                std::cmp::Ordering::Less => (0..per_page)
                    .map(|i| file(format!("src/gen/f{}_{}.rs", page, i)))
                    .collect(),
                std::cmp::Ordering::Equal => vec![file("src/lib.rs".into())],
                std::cmp::Ordering::Greater => Vec::new(),
            })
        }

        async fn create_pull(
            &self,
            _owner: &str,
            _repo: &str,
            pull: &NewPullRequest,
        ) -> Result<PullRequest, GithubError> {
            self.record(format!("create_pull {} -> {}", pull.head, pull.base));
            Err(GithubError::Indeterminate(
                "creating pull request may or may not have been applied: operation timed out"
                    .into(),
            ))
        }

        async fn list_branches(
            &self,
            owner: &str,
            repo: &str,
            per_page: u32,
            page: u32,
        ) -> Result<Vec<Branch>, GithubError> {
            self.record(format!("list_branches {}/{} {} {}", owner, repo, per_page, page));
            if page as usize > self.branch_pages {
                return Ok(Vec::new());
            }
            Ok((0..per_page)
                .map(|i| Branch {
                    name: format!("b{}-{}", page, i),
                    ..Default::default()
                })
                .collect())
        }

        async fn get_commit(
            &self,
            _owner: &str,
            _repo: &str,
            sha: &str,
        ) -> Result<Commit, GithubError> {
            self.record(format!("get_commit {}", sha));
            Ok(Commit {
                sha: sha.to_string(),
                commit: CommitDetail {
                    message: "Fix parser\n\nLonger explanation".into(),
                    ..Default::default()
                },
                html_url: format!("https://github.com/octo/hello/commit/{}", sha),
                ..Default::default()
            })
        }

        async fn list_commits(
            &self,
            _owner: &str,
            _repo: &str,
            query: &CommitQuery,
        ) -> Result<Vec<Commit>, GithubError> {
            self.record(format!("list_commits {:?} {}", query.path, query.per_page));
            Ok(vec![self.get_commit("", "", "abc123").await?])
        }
    }

    fn dispatcher(fake: Arc<FakeGithub>) -> Dispatcher<GithubContext> {
        Dispatcher::new(
            Arc::new(GithubContext::new(fake)),
            crate::tools().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_missing_required_param_never_calls_github() {
        let fake = Arc::new(FakeGithub::default());
        let d = dispatcher(fake.clone());

        let err = d
            .invoke("get_repo_info", json!({ "owner": "octo" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_owner_pattern_is_enforced() {
        let fake = Arc::new(FakeGithub::default());
        let d = dispatcher(fake.clone());

        let err = d
            .invoke("get_repo_info", json!({ "owner": "../etc", "repo": "hello" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_issues_clamps_limit_and_drops_pull_requests() {
        let fake = Arc::new(FakeGithub::default());
        let d = dispatcher(fake.clone());

        let out = d
            .invoke(
                "list_issues",
                json!({ "owner": "octo", "repo": "hello", "limit": 500 }),
            )
            .await
            .unwrap();
        assert_eq!(out["count"], json!(2));
        assert_eq!(out["issues"][1]["number"], json!(3));

        d.invoke(
            "list_pull_requests",
            json!({ "owner": "octo", "repo": "hello", "limit": 0, "state": "all" }),
        )
        .await
        .unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "list_issues octo/hello open 100".to_string(),
                "list_pulls octo/hello all 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_issues_rejects_unknown_state() {
        let fake = Arc::new(FakeGithub::default());
        let err = dispatcher(fake)
            .invoke(
                "list_issues",
                json!({ "owner": "octo", "repo": "hello", "state": "merged" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_repo_is_not_found() {
        let fake = Arc::new(FakeGithub::default());
        let err = dispatcher(fake)
            .invoke("get_repo_info", json!({ "owner": "octo", "repo": "missing" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_file_content_decodes_base64() {
        let fake = Arc::new(FakeGithub::default());
        *fake.contents.lock().unwrap() = Some(Contents::Entry(ContentEntry {
            kind: "file".into(),
            path: "README.md".into(),
            content: Some("aGVsbG8g\nd29ybGQ=\n".into()),
            encoding: Some("base64".into()),
            size: 11,
            sha: "abc".into(),
            html_url: None,
        }));
        let d = dispatcher(fake.clone());

        let out = d
            .invoke(
                "get_file_content",
                json!({ "owner": "octo", "repo": "hello", "path": "README.md", "ref": "v1" }),
            )
            .await
            .unwrap();
        assert_eq!(out["content"], json!("hello world"));
        assert_eq!(out["encoding"], json!("base64"));
        assert_eq!(fake.calls(), vec![r#"get_contents octo/hello/README.md Some("v1")"#]);
    }

    #[tokio::test]
    async fn test_get_file_content_binary_placeholder() {
        let fake = Arc::new(FakeGithub::default());
        *fake.contents.lock().unwrap() = Some(Contents::Entry(ContentEntry {
            kind: "file".into(),
            path: "logo.png".into(),
            content: Some(STANDARD.encode([0xff, 0xfe, 0x00, 0x81])),
            encoding: Some("base64".into()),
            size: 4,
            sha: "abc".into(),
            html_url: None,
        }));
        let out = dispatcher(fake)
            .invoke(
                "get_file_content",
                json!({ "owner": "octo", "repo": "hello", "path": "logo.png" }),
            )
            .await
            .unwrap();
        assert!(out["content"].as_str().unwrap().starts_with("[binary file"));
    }

    #[tokio::test]
    async fn test_get_file_content_directory_is_ambiguous() {
        let fake = Arc::new(FakeGithub::default());
        *fake.contents.lock().unwrap() = Some(Contents::Directory(vec![
            json!({ "type": "file", "path": "src/lib.rs" }),
        ]));
        let d = dispatcher(fake.clone());

        let err = d
            .invoke(
                "get_file_content",
                json!({ "owner": "octo", "repo": "hello", "path": "src" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousPath);

        *fake.contents.lock().unwrap() = Some(Contents::Entry(ContentEntry {
            kind: "submodule".into(),
            path: "vendor/lib".into(),
            sha: "abc".into(),
            ..Default::default()
        }));
        let err = d
            .invoke(
                "get_file_content",
                json!({ "owner": "octo", "repo": "hello", "path": "vendor/lib" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousPath);
    }

    #[tokio::test]
    async fn test_create_issue_defaults_body_and_labels() {
        let fake = Arc::new(FakeGithub::default());
        let out = dispatcher(fake.clone())
            .invoke(
                "create_issue",
                json!({ "owner": "octo", "repo": "hello", "title": "Crash on start" }),
            )
            .await
            .unwrap();

        assert_eq!(out["number"], json!(42));
        assert_eq!(out["state"], json!("open"));
        assert_eq!(
            fake.created.lock().unwrap().as_slice(),
            &[NewIssue {
                title: "Crash on start".into(),
                body: String::new(),
                labels: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_create_issue_rejects_blank_title() {
        let fake = Arc::new(FakeGithub::default());
        let err = dispatcher(fake.clone())
            .invoke(
                "create_issue",
                json!({ "owner": "octo", "repo": "hello", "title": "   " }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_issue_after_cancellation_surfaces_ambiguity() {
        let hanging = Arc::new(FakeGithub {
            hang_on_create: true,
            ..Default::default()
        });
        let ctx = Arc::new(GithubContext::new(hanging.clone()));
        let d = Dispatcher::new(ctx.clone(), crate::tools().unwrap());
        let args = json!({ "owner": "octo", "repo": "hello", "title": "Crash on start" });

        let first = tokio::time::timeout(Duration::from_millis(20), d.invoke("create_issue", args.clone())).await;
        assert!(first.is_err(), "create should have been cancelled");
        assert_eq!(hanging.calls(), vec!["create_issue octo/hello"]);

        let err = d.invoke("create_issue", args.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Indeterminate);
        assert_eq!(hanging.calls().len(), 1, "repeat must not reach GitHub");

        let different = json!({ "owner": "octo", "repo": "hello", "title": "Other bug" });
        let err = tokio::time::timeout(Duration::from_millis(20), d.invoke("create_issue", different)).await;
        assert!(err.is_err(), "unrelated titles are not blocked");
        assert_eq!(hanging.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_acknowledged_repeat_is_sent_and_clears_mark() {
        let fake = Arc::new(FakeGithub::default());
        let ctx = Arc::new(GithubContext::new(fake.clone()));
        let key = WriteKey::new("create_issue", "octo", "hello", "Crash on start");
        ctx.pending().begin(key.clone()).keep();
        let d = Dispatcher::new(ctx.clone(), crate::tools().unwrap());

        let out = d
            .invoke(
                "create_issue",
                json!({
                    "owner": "octo", "repo": "hello", "title": "Crash on start",
                    "acknowledge_possible_duplicate": true
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["number"], json!(42));
        assert!(!ctx.pending().is_marked(&key));
    }

    #[tokio::test]
    async fn test_create_pull_request_timeout_is_indeterminate() {
        let fake = Arc::new(FakeGithub::default());
        let ctx = Arc::new(GithubContext::new(fake.clone()));
        let d = Dispatcher::new(ctx.clone(), crate::tools().unwrap());
        let args = json!({
            "owner": "octo", "repo": "hello", "title": "Add feature",
            "head": "feature", "base": "main"
        });

        let err = d.invoke("create_pull_request", args.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Indeterminate);
        assert_eq!(ctx.pending().len(), 1);

        let err = d.invoke("create_pull_request", args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Indeterminate);
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_issue_requires_a_change() {
        let fake = Arc::new(FakeGithub::default());
        let d = dispatcher(fake.clone());

        let err = d
            .invoke("update_issue", json!({ "owner": "octo", "repo": "hello", "number": 5 }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = d
            .invoke(
                "update_issue",
                json!({ "owner": "octo", "repo": "hello", "number": 0, "state": "closed" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(fake.calls().is_empty());

        let out = d
            .invoke(
                "update_issue",
                json!({ "owner": "octo", "repo": "hello", "number": 5, "state": "closed" }),
            )
            .await
            .unwrap();
        assert_eq!(out["state"], json!("closed"));
        assert_eq!(
            fake.calls(),
            vec![r#"update_issue octo/hello#5 {"state":"closed"}"#]
        );
    }

    #[tokio::test]
    async fn test_list_user_repos_paginates_and_counts() {
        let fake = Arc::new(FakeGithub {
            repo_pages: 3,
            ..Default::default()
        });
        let out = dispatcher(fake.clone())
            .invoke("list_user_repos", json!({ "limit": 150 }))
            .await
            .unwrap();

        assert_eq!(out["user"], json!("octocat"));
        assert_eq!(out["total_count"], json!(150));
        assert_eq!(out["private_count"], json!(15));
        assert_eq!(out["public_count"], json!(135));
        assert_eq!(
            fake.calls(),
            vec![
                "list_user_repos None 100 1",
                "list_user_repos None 100 2",
                "GET /user",
            ]
        );
    }

    #[tokio::test]
    async fn test_get_pull_request_includes_files() {
        let fake = Arc::new(FakeGithub::default());
        let out = dispatcher(fake)
            .invoke(
                "get_pull_request",
                json!({ "owner": "octo", "repo": "hello", "number": 9 }),
            )
            .await
            .unwrap();
        assert_eq!(out["head"], json!("feature"));
        assert_eq!(out["base"], json!("main"));
        assert_eq!(out["changed_files_count"], json!(1));
        assert_eq!(out["changed_files"][0]["filename"], json!("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_list_commits_keeps_first_line() {
        let fake = Arc::new(FakeGithub::default());
        let out = dispatcher(fake)
            .invoke(
                "list_commits",
                json!({ "owner": "octo", "repo": "hello", "path": "src" }),
            )
            .await
            .unwrap();
        assert_eq!(out["commits"][0]["message"], json!("Fix parser"));
    }

    #[tokio::test]
    async fn test_search_code_zero_hits_is_success() {
        let fake = Arc::new(FakeGithub::default());
        let out = dispatcher(fake.clone())
            .invoke("search_code", json!({ "query": "repo:octo/hello nothing" }))
            .await
            .unwrap();
        assert_eq!(out["total_count"], json!(0));
        assert_eq!(out["items"], json!([]));
        assert_eq!(fake.calls(), vec!["search_code repo:octo/hello nothing 30"]);
    }

    #[tokio::test]
    async fn test_search_repositories_defaults() {
        let fake = Arc::new(FakeGithub::default());
        let out = dispatcher(fake.clone())
            .invoke("search_repositories", json!({ "query": "language:rust", "limit": 1000 }))
            .await
            .unwrap();
        assert_eq!(out["items"][0]["full_name"], json!("octo/hello"));
        assert_eq!(fake.calls(), vec!["search_repositories language:rust stars desc 100"]);
    }

    #[tokio::test]
    async fn test_get_commit_info_and_branches() {
        let fake = Arc::new(FakeGithub::default());
        let d = dispatcher(fake.clone());

        let out = d
            .invoke(
                "get_commit_info",
                json!({ "owner": "octo", "repo": "hello", "sha": "abc123" }),
            )
            .await
            .unwrap();
        assert_eq!(out["message"], json!("Fix parser\n\nLonger explanation"));
        assert_eq!(out["changed_files_count"], json!(0));

        let out = d
            .invoke("list_branches", json!({ "owner": "octo", "repo": "hello" }))
            .await
            .unwrap();
        assert_eq!(out["count"], json!(0));
        assert_eq!(
            fake.calls(),
            vec!["get_commit abc123", "list_branches octo/hello 100 1"]
        );
    }

    #[tokio::test]
    async fn test_list_branches_pages_up_to_limit() {
        let fake = Arc::new(FakeGithub {
            branch_pages: 5,
            ..Default::default()
        });
        let out = dispatcher(fake.clone())
            .invoke(
                "list_branches",
                json!({ "owner": "octo", "repo": "hello", "limit": 250 }),
            )
            .await
            .unwrap();
        assert_eq!(out["count"], json!(250));
        assert_eq!(out["branches"][249]["name"], json!("b3-49"));
        assert_eq!(
            fake.calls(),
            vec![
                "list_branches octo/hello 100 1",
                "list_branches octo/hello 100 2",
                "list_branches octo/hello 100 3",
            ]
        );

        let fake = Arc::new(FakeGithub::default());
        dispatcher(fake.clone())
            .invoke(
                "list_branches",
                json!({ "owner": "octo", "repo": "hello", "limit": 5000 }),
            )
            .await
            .unwrap();
        assert_eq!(fake.calls(), vec!["list_branches octo/hello 100 1"]);
    }

    #[tokio::test]
    async fn test_get_pull_request_counts_every_changed_file() {
        let fake = Arc::new(FakeGithub {
            pull_file_pages: 2,
            ..Default::default()
        });
        let out = dispatcher(fake.clone())
            .invoke(
                "get_pull_request",
                json!({ "owner": "octo", "repo": "hello", "number": 9 }),
            )
            .await
            .unwrap();
        assert_eq!(out["changed_files_count"], json!(201));
        assert_eq!(out["changed_files"][200]["filename"], json!("src/lib.rs"));
        assert_eq!(
            fake.calls(),
            vec![
                "get_pull #9",
                "list_pull_files #9 100 1",
                "list_pull_files #9 100 2",
                "list_pull_files #9 100 3",
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_concurrent_creates_send_once() {
        let hanging = Arc::new(FakeGithub {
            hang_on_create: true,
            ..Default::default()
        });
        let d = dispatcher(hanging.clone());
        let args = json!({ "owner": "octo", "repo": "hello", "title": "Crash on start" });

        let (a, b) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(20), d.invoke("create_issue", args.clone())),
            tokio::time::timeout(Duration::from_millis(20), d.invoke("create_issue", args.clone())),
        );
        let refused = [a, b]
            .into_iter()
            .filter_map(Result::ok)
            .map(|r| r.unwrap_err().kind())
            .collect::<Vec<_>>();
        assert_eq!(refused, vec![ErrorKind::Indeterminate]);
        assert_eq!(hanging.calls(), vec!["create_issue octo/hello"]);
    }
}
