use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "toolgate", version, about = "MCP stdio servers for GitHub and PostgreSQL")]
struct Cli {
    /// Log filter, e.g. `debug` or `toolgate_pg=debug,info`. Logs go to stderr.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the GitHub tools over stdio.
    Github(commands::github::GithubArgs),

    /// Serve the PostgreSQL query tool over stdio.
    Postgres(commands::postgres::PostgresArgs),
}

/// stdout carries protocol frames, so logs are written to stderr.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level.to_ascii_lowercase()).unwrap_or_else(|e| {
        eprintln!("invalid LOG_LEVEL '{}' ({}), using info", level, e);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.cmd {
        Command::Github(args) => commands::github::execute(args).await,
        Command::Postgres(args) => commands::postgres::execute(args).await,
    }
}
