use std::sync::Arc;

use tracing::{error, info};

use crate::app::{AppContext, CommandResponse, Result, RuleRequest};
use crate::config::format_duration;
use crate::domain::{normalize_external_id, Rule, Subreddit};
use crate::fetcher::HttpFeedClient;
use crate::gateway;
use crate::messenger::DiscordMessenger;
use crate::orchestrator::{spawn_signal_handler, Orchestrator};
use crate::store::RuleStore;

/// Run the pipeline, and the slash command session when enabled, until
/// SIGINT or SIGTERM. A failed session stops the pipeline too.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let token = ctx.config.discord_token()?;
    let poller = ctx.config.poller_settings()?;
    let pipeline = ctx.config.pipeline_settings()?;

    let client = Arc::new(HttpFeedClient::new(poller.timeout)?);
    let messenger = Arc::new(DiscordMessenger::new(
        &token,
        &ctx.config.discord.api_base,
        pipeline.op_timeout,
    )?);

    info!(
        interval = %format_duration(poller.interval),
        workers = pipeline.evaluator_workers,
        pid = std::process::id(),
        "reddit-spy starting"
    );

    let orchestrator = Orchestrator::new(
        ctx.store.clone(),
        client,
        messenger,
        poller,
        pipeline,
        ctx.cancel.clone(),
    );
    orchestrator.seed().await?;

    let session = ctx.config.discord.commands.then(|| {
        let bot = Arc::new(ctx.bot().with_registry(orchestrator.registry()));
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway::run(&token, bot, cancel.clone()).await {
                error!(error = %e, "discord session failed");
                cancel.cancel();
            }
        })
    });

    spawn_signal_handler(ctx.cancel.clone());
    let result = orchestrator.run().await;
    if let Some(session) = session {
        session.await?;
    }
    result
}

pub async fn add_rule(ctx: &AppContext, request: &RuleRequest) -> Result<CommandResponse> {
    let (rule, subreddit) = ctx.bot().create_rule(request).await?;
    let response = CommandResponse::created(&rule, &subreddit, &request.channel);
    println!("{}", response.message);
    Ok(response)
}

async fn find_subreddit(ctx: &AppContext, name: &str) -> Result<Option<Subreddit>> {
    let wanted = normalize_external_id(name.trim_start_matches("r/"));
    let subreddits = ctx.store.all_subreddits(&ctx.cancel).await?;
    Ok(subreddits.into_iter().find(|s| s.external_id == wanted))
}

pub fn describe_rule(rule: &Rule, channel: &str) -> String {
    format!(
        "#{} {} {} \"{}\" -> channel {}",
        rule.id,
        rule.target_field,
        if rule.exact { "is" } else { "contains" },
        rule.target_value,
        channel
    )
}

pub async fn list_rules(ctx: &AppContext, subreddit: &str) -> Result<Vec<String>> {
    let Some(subreddit) = find_subreddit(ctx, subreddit).await? else {
        println!("Not watching r/{}", subreddit);
        return Ok(Vec::new());
    };

    let rules = ctx
        .store
        .rules_for_subreddit(&ctx.cancel, subreddit.id)
        .await?;
    if rules.is_empty() {
        println!("No rules for r/{}", subreddit.external_id);
        return Ok(Vec::new());
    }

    let mut lines = Vec::with_capacity(rules.len());
    for rule in &rules {
        let channel = ctx
            .store
            .channel_external_id(&ctx.cancel, rule.channel_id)
            .await?;
        lines.push(describe_rule(rule, &channel));
    }

    println!("r/{}", subreddit.external_id);
    for line in &lines {
        println!("  {}", line);
    }
    Ok(lines)
}

pub async fn list_subreddits(ctx: &AppContext) -> Result<Vec<Subreddit>> {
    let subreddits = ctx.store.subreddits_with_rules(&ctx.cancel).await?;

    if subreddits.is_empty() {
        println!("No subreddits");
        return Ok(subreddits);
    }

    for subreddit in &subreddits {
        let rules = ctx
            .store
            .rules_for_subreddit(&ctx.cancel, subreddit.id)
            .await?;
        println!("r/{} ({} rules)", subreddit.external_id, rules.len());
    }
    Ok(subreddits)
}
