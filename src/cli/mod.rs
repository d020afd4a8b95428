pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reddit-spy")]
#[command(about = "Watch subreddits and announce matching posts on Discord", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/reddit-spy/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll every watched subreddit and deliver notifications until stopped
    Run,
    /// Manage notification rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// List watched subreddits
    Subreddits,
}

#[derive(Subcommand)]
pub enum RuleAction {
    /// Notify a channel about posts matching a value
    Add {
        /// Subreddit to watch, without the r/ prefix
        subreddit: String,

        /// Value to look for
        value: String,

        /// Discord server (guild) id
        #[arg(long)]
        server: String,

        /// Discord channel id
        #[arg(long)]
        channel: String,

        /// Post field to match: "title" or "author"
        #[arg(short, long, default_value = "title")]
        field: String,

        /// Require the whole field to equal the value instead of containing it
        #[arg(long)]
        exact: bool,
    },
    /// List the rules of a subreddit
    List {
        subreddit: String,
    },
}
