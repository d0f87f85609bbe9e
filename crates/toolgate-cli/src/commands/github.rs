//! `toolgate github`

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use toolgate_github::{GithubConfig, GithubContext, RestClient};
use tracing::info;

#[derive(Debug, Args)]
pub struct GithubArgs {
    /// Personal access token (or GITHUB_TOKEN).
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// REST API base URL; set for GitHub Enterprise.
    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(
        long,
        env = "GITHUB_TIMEOUT_SECS",
        default_value_t = toolgate_github::config::DEFAULT_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,
}

pub async fn execute(args: GithubArgs) -> Result<()> {
    let config = GithubConfig::new(args.token, args.api_url, args.timeout_secs)
        .context("invalid GitHub configuration")?;
    info!(api_url = %config.api_url(), "starting GitHub server");

    let client = Arc::new(RestClient::new(&config).context("invalid GitHub configuration")?);
    let login = toolgate_github::verify(client.as_ref())
        .await
        .context("GitHub token check failed")?;
    info!(login = %login, "GitHub token accepted");

    let server = toolgate_github::server(GithubContext::new(client))?;
    Arc::new(server).run_stdio().await?;
    info!("GitHub server stopped");
    Ok(())
}
