//! Subcommand implementations. Each one runs a single server until stdin closes.

pub mod github;
pub mod postgres;
