//! # toolgate-github
//!
//! GitHub over MCP: repository, code search, issue, pull request and commit
//! tools backed by the REST API, plus `repo://`, `file://` and `issue://`
//! resources.
//!
//! Every tool makes its upstream call(s) through the [`GithubApi`] seam.
//! Creates are never retried; an unknown outcome is reported as
//! `Indeterminate` and recorded in the pending-write ledger.

pub mod client;
pub mod config;
pub mod context;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod resources;

pub use client::{GithubApi, GithubError, RestClient, verify};
pub use config::GithubConfig;
pub use context::GithubContext;
pub use ledger::{PendingWrites, WriteKey};

use std::sync::Arc;
use toolgate_mcp::{
    Dispatcher, McpError, McpServer, ResourceRouter, ResourceSpec, ServerInfo, ToolRegistry,
};

pub const SERVER_NAME: &str = "github-mcp-server";

pub fn tools() -> Result<ToolRegistry<GithubContext>, McpError> {
    use handlers::*;

    let mut registry = ToolRegistry::new();
    registry.register(search_code_descriptor(), Arc::new(SearchCode))?;
    registry.register(get_repo_info_descriptor(), Arc::new(GetRepoInfo))?;
    registry.register(get_file_content_descriptor(), Arc::new(GetFileContent))?;
    registry.register(list_issues_descriptor(), Arc::new(ListIssues))?;
    registry.register(create_issue_descriptor(), Arc::new(CreateIssue))?;
    registry.register(list_pull_requests_descriptor(), Arc::new(ListPullRequests))?;
    registry.register(list_user_repos_descriptor(), Arc::new(ListUserRepos))?;
    registry.register(create_pull_request_descriptor(), Arc::new(CreatePullRequest))?;
    registry.register(get_pull_request_descriptor(), Arc::new(GetPullRequest))?;
    registry.register(update_issue_descriptor(), Arc::new(UpdateIssue))?;
    registry.register(search_repositories_descriptor(), Arc::new(SearchRepositories))?;
    registry.register(list_branches_descriptor(), Arc::new(ListBranches))?;
    registry.register(get_commit_info_descriptor(), Arc::new(GetCommitInfo))?;
    registry.register(list_commits_descriptor(), Arc::new(ListCommits))?;
    Ok(registry)
}

pub fn resources() -> ResourceRouter<GithubContext> {
    let mut router = ResourceRouter::new();
    router.register(
        ResourceSpec::exact(
            "github://info",
            "Server info",
            "Server name, description and available tools",
        ),
        Arc::new(resources::ServerInfoResource),
    );
    router.register(
        ResourceSpec::template(
            "repo://{owner}/{repo}",
            "Repository",
            "Repository details, as get_repo_info",
        ),
        Arc::new(resources::RepoResource),
    );
    router.register(
        ResourceSpec::template(
            "file://{owner}/{repo}/{path*}",
            "File",
            "File content, as get_file_content; append ?ref=<branch|tag|sha> to pin a revision",
        ),
        Arc::new(resources::FileResource),
    );
    router.register(
        ResourceSpec::template(
            "issue://{owner}/{repo}/{number}",
            "Issue",
            "A single issue",
        ),
        Arc::new(resources::IssueResource),
    );
    router
}

/// Assemble the server around an already-verified context.
pub fn server(ctx: GithubContext) -> Result<McpServer<GithubContext>, McpError> {
    let server = McpServer::new(
        ServerInfo::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
        Dispatcher::new(Arc::new(ctx), tools()?),
        resources(),
    )
    .with_instructions(
        "GitHub tools. create_issue and create_pull_request are never retried; if one \
         reports an unknown outcome, check GitHub before repeating it.",
    );
    Ok(server)
}
