//! `github://`, `repo://`, `file://` and `issue://` resources.

use crate::context::GithubContext;
use crate::handlers::{file_content, issue_detail, repo_info};
use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_mcp::{ResourceProvider, ToolError, UriMatch, ValidationError};

/// Tool names with one-line purposes, served without an upstream call.
pub const TOOL_SUMMARIES: &[(&str, &str)] = &[
    ("search_code", "Search code across GitHub"),
    ("get_repo_info", "Repository details"),
    ("get_file_content", "Read one file"),
    ("list_issues", "List issues, newest activity first"),
    ("create_issue", "Create an issue"),
    ("list_pull_requests", "List pull requests, newest activity first"),
    ("list_user_repos", "List a user's repositories"),
    ("create_pull_request", "Open a pull request"),
    ("get_pull_request", "Pull request details and changed files"),
    ("update_issue", "Change an issue's state, title, body or labels"),
    ("search_repositories", "Search repositories"),
    ("list_branches", "List branches"),
    ("get_commit_info", "Commit details and changed files"),
    ("list_commits", "List commits"),
];

pub struct ServerInfoResource;

#[async_trait]
impl ResourceProvider<GithubContext> for ServerInfoResource {
    async fn read(&self, _ctx: &GithubContext, _uri: &UriMatch) -> Result<Value, ToolError> {
        let tools: Vec<Value> = TOOL_SUMMARIES
            .iter()
            .map(|(name, purpose)| json!({ "name": name, "description": purpose }))
            .collect();
        Ok(json!({
            "name": crate::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "description": "GitHub repositories, code, issues, pull requests and commits over MCP",
            "tools": tools,
        }))
    }
}

pub struct RepoResource;

#[async_trait]
impl ResourceProvider<GithubContext> for RepoResource {
    async fn read(&self, ctx: &GithubContext, uri: &UriMatch) -> Result<Value, ToolError> {
        repo_info(ctx, uri.require("owner")?, uri.require("repo")?).await
    }
}

pub struct FileResource;

#[async_trait]
impl ResourceProvider<GithubContext> for FileResource {
    async fn read(&self, ctx: &GithubContext, uri: &UriMatch) -> Result<Value, ToolError> {
        file_content(
            ctx,
            uri.require("owner")?,
            uri.require("repo")?,
            uri.require("path")?,
            uri.query_param("ref"),
        )
        .await
    }
}

pub struct IssueResource;

#[async_trait]
impl ResourceProvider<GithubContext> for IssueResource {
    async fn read(&self, ctx: &GithubContext, uri: &UriMatch) -> Result<Value, ToolError> {
        let raw = uri.require("number")?;
        let number = raw
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ToolError::from(ValidationError::field(
                    "number",
                    format!("'{}' is not an issue number", raw),
                ))
            })?;
        issue_detail(ctx, uri.require("owner")?, uri.require("repo")?, number).await
    }
}
