//! GitHub REST payloads, trimmed to the fields the tools return.
//!
//! Everything optional upstream is optional here; missing fields default
//! instead of failing the whole response.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub default_branch: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub html_url: String,
    /// Present when the "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub user: Option<User>,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub comments: Option<u64>,
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub merged_at: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoSummary {
    pub full_name: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextMatch {
    #[serde(default)]
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeItem {
    pub name: String,
    pub path: String,
    pub sha: String,
    pub html_url: String,
    pub repository: RepoSummary,
    #[serde(default)]
    pub text_matches: Vec<TextMatch>,
}

/// `GET /repos/{o}/{r}/contents/{path}` answers with an object for a file
/// (or symlink/submodule) and an array for a directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Entry(ContentEntry),
    Directory(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub sha: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchLinks {
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
    #[serde(default)]
    pub protected: bool,
    #[serde(default, rename = "_links")]
    pub links: Option<BranchLinks>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitActor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    #[serde(default)]
    pub author: Option<GitActor>,
    #[serde(default)]
    pub committer: Option<GitActor>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommitStats {
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub commit: CommitDetail,
    #[serde(default)]
    pub stats: Option<CommitStats>,
    #[serde(default)]
    pub files: Vec<ChangedFile>,
    pub html_url: String,
}

/// Body of `POST /repos/{o}/{r}/issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Body of `PATCH /repos/{o}/{r}/issues/{n}`; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl IssuePatch {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.title.is_none() && self.body.is_none() && self.labels.is_none()
    }
}

/// Body of `POST /repos/{o}/{r}/pulls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub draft: bool,
}

/// Filters shared by the issue and pull request listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub state: String,
    pub per_page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitQuery {
    pub sha: Option<String>,
    pub path: Option<String>,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contents_file_vs_directory() {
        let file: Contents = serde_json::from_value(json!({
            "type": "file", "path": "README.md", "content": "aGk=\n", "encoding": "base64",
            "size": 2, "sha": "abc", "html_url": "https://github.com/o/r/blob/main/README.md"
        }))
        .unwrap();
        assert!(matches!(file, Contents::Entry(ref e) if e.kind == "file"));

        let dir: Contents = serde_json::from_value(json!([
            {"type": "file", "path": "src/lib.rs", "sha": "1"},
            {"type": "dir", "path": "src/bin", "sha": "2"}
        ]))
        .unwrap();
        assert!(matches!(dir, Contents::Directory(ref items) if items.len() == 2));
    }

    #[test]
    fn test_issue_pull_request_marker() {
        let issue: Issue = serde_json::from_value(json!({
            "number": 7, "title": "t", "state": "open",
            "html_url": "https://github.com/o/r/pull/7",
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/7"}
        }))
        .unwrap();
        assert!(issue.is_pull_request());
        assert!(issue.labels.is_empty());
    }

    #[test]
    fn test_issue_patch_skips_unset_fields() {
        let patch = IssuePatch {
            state: Some("closed".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"state": "closed"}));
        assert!(IssuePatch::default().is_empty());
    }
}
