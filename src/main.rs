use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reddit_spy::app::{AppContext, RuleRequest};
use reddit_spy::cli::{commands, Cli, Commands, RuleAction};
use reddit_spy::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reddit_spy=info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config, cli.db)?;

    match cli.command {
        Commands::Run => {
            commands::run(&ctx).await?;
        }
        Commands::Rule { action } => match action {
            RuleAction::Add {
                subreddit,
                value,
                server,
                channel,
                field,
                exact,
            } => {
                let request = RuleRequest {
                    subreddit,
                    server,
                    channel,
                    target_field: field,
                    value,
                    exact,
                };
                commands::add_rule(&ctx, &request).await?;
            }
            RuleAction::List { subreddit } => {
                commands::list_rules(&ctx, &subreddit).await?;
            }
        },
        Commands::Subreddits => {
            commands::list_subreddits(&ctx).await?;
        }
    }

    Ok(())
}
