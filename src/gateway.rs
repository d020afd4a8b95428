//! Discord gateway session and the `add_subreddit_listener` slash command.
//!
//! The command is registered globally once the session is ready. Each
//! invocation becomes a [`RuleRequest`] for the guild and channel it was
//! issued in and goes through the same [`Bot`] the daemon polls with, so a
//! new subreddit starts polling right away.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Command, CommandDataOptionValue, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EventHandler, GatewayIntents, GuildId, Interaction, Ready,
};
use tracing::{error, info, warn};

use crate::app::{Bot, CancelToken, CommandResponse, Result, RuleRequest, SpyError};

pub const ADD_LISTENER: &str = "add_subreddit_listener";

pub fn add_listener_command() -> CreateCommand {
    CreateCommand::new(ADD_LISTENER)
        .description("Add a listener to a subreddit to generate a message when criteria is met")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "subreddit",
                "Name of the subreddit you want to listen to",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "match_on",
                "Which post field to match on",
            )
            .required(true)
            .add_string_choice("author", "author")
            .add_string_choice("title", "title"),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "value",
                "The value to look for",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Boolean,
                "exact",
                "Require an exact match instead of a partial one",
            )
            .required(true),
        )
}

/// Build a rule request from the options of one command invocation.
pub fn rule_request<'a>(
    guild_id: Option<GuildId>,
    channel_id: ChannelId,
    options: impl IntoIterator<Item = (&'a str, &'a CommandDataOptionValue)>,
) -> Result<RuleRequest> {
    let Some(guild_id) = guild_id else {
        return Err(SpyError::InvalidRule(
            "listeners can only be added in a server channel".into(),
        ));
    };

    let mut request = RuleRequest {
        subreddit: String::new(),
        server: guild_id.to_string(),
        channel: channel_id.to_string(),
        target_field: String::new(),
        value: String::new(),
        exact: false,
    };
    for (name, value) in options {
        match (name, value) {
            ("subreddit", CommandDataOptionValue::String(s)) => request.subreddit = s.clone(),
            ("match_on", CommandDataOptionValue::String(s)) => request.target_field = s.clone(),
            ("value", CommandDataOptionValue::String(s)) => request.value = s.clone(),
            ("exact", CommandDataOptionValue::Boolean(b)) => request.exact = *b,
            _ => warn!(option = name, "unexpected command option"),
        }
    }

    if request.subreddit.trim().is_empty() {
        return Err(SpyError::InvalidRule("subreddit must not be empty".into()));
    }
    Ok(request)
}

pub struct Handler {
    bot: Arc<Bot>,
}

impl Handler {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }

    pub async fn handle_add_listener<'a>(
        &self,
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
        options: impl IntoIterator<Item = (&'a str, &'a CommandDataOptionValue)>,
    ) -> CommandResponse {
        match rule_request(guild_id, channel_id, options) {
            Ok(request) => self.bot.handle_create_rule(&request).await,
            Err(e) => CommandResponse::failed(&e),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "discord session ready");
        if let Err(e) = Command::create_global_command(&ctx.http, add_listener_command()).await {
            error!(error = %e, command = ADD_LISTENER, "failed to register command");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != ADD_LISTENER {
            return;
        }

        let response = self
            .handle_add_listener(
                command.guild_id,
                command.channel_id,
                command
                    .data
                    .options
                    .iter()
                    .map(|option| (option.name.as_str(), &option.value)),
            )
            .await;

        let reply = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(response.message)
                .ephemeral(true),
        );
        if let Err(e) = command.create_response(&ctx.http, reply).await {
            warn!(
                error = %e,
                channel = %command.channel_id,
                "failed to answer command"
            );
        }
    }
}

/// Hold a gateway session until `cancel` fires or the session fails.
pub async fn run(token: &str, bot: Arc<Bot>, cancel: CancelToken) -> Result<()> {
    let mut client = Client::builder(token, GatewayIntents::GUILDS)
        .event_handler(Handler::new(bot))
        .await?;

    let shards = client.shard_manager.clone();
    let shutdown = tokio::spawn(async move {
        cancel.cancelled().await;
        shards.shutdown_all().await;
    });

    let result = client.start().await;
    shutdown.abort();
    info!("discord session closed");
    result.map_err(SpyError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::{PollerRegistry, PollerSettings};
    use crate::store::{RuleStore, SqliteStore};
    use crate::testing::MockFeedClient;
    use tokio::sync::mpsc;

    fn options() -> Vec<(&'static str, CommandDataOptionValue)> {
        vec![
            ("subreddit", CommandDataOptionValue::String("Rust".into())),
            ("match_on", CommandDataOptionValue::String("title".into())),
            ("value", CommandDataOptionValue::String("release".into())),
            ("exact", CommandDataOptionValue::Boolean(false)),
        ]
    }

    fn borrowed<'a>(
        options: &'a [(&'static str, CommandDataOptionValue)],
    ) -> impl Iterator<Item = (&'a str, &'a CommandDataOptionValue)> + 'a {
        options.iter().map(|(name, value)| (&**name, value))
    }

    #[test]
    fn test_add_listener_command_shape() {
        let json = serde_json::to_value(add_listener_command()).unwrap();

        assert_eq!(json["name"], ADD_LISTENER);
        let names: Vec<&str> = json["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["subreddit", "match_on", "value", "exact"]);

        let choices: Vec<&str> = json["options"][1]["choices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["value"].as_str().unwrap())
            .collect();
        assert_eq!(choices, vec!["author", "title"]);
    }

    #[test]
    fn test_rule_request_reads_options() {
        let options = options();
        let request = rule_request(
            Some(GuildId::new(7)),
            ChannelId::new(42),
            borrowed(&options),
        )
        .unwrap();

        assert_eq!(
            request,
            RuleRequest {
                subreddit: "Rust".into(),
                server: "7".into(),
                channel: "42".into(),
                target_field: "title".into(),
                value: "release".into(),
                exact: false,
            }
        );
    }

    #[test]
    fn test_rule_request_ignores_unknown_options() {
        let mut options = options();
        options.push(("flair", CommandDataOptionValue::String("news".into())));
        options.push(("exact", CommandDataOptionValue::Boolean(true)));

        let request =
            rule_request(Some(GuildId::new(7)), ChannelId::new(42), borrowed(&options)).unwrap();

        assert!(request.exact);
        assert_eq!(request.target_field, "title");
    }

    #[test]
    fn test_rule_request_outside_a_server_is_rejected() {
        let options = options();
        let err = rule_request(None, ChannelId::new(42), borrowed(&options)).unwrap_err();
        assert!(matches!(err, SpyError::InvalidRule(_)));
    }

    #[test]
    fn test_rule_request_without_subreddit_is_rejected() {
        let options = vec![("match_on", CommandDataOptionValue::String("title".into()))];
        let err =
            rule_request(Some(GuildId::new(7)), ChannelId::new(42), borrowed(&options)).unwrap_err();
        assert!(matches!(err, SpyError::InvalidRule(_)));
    }

    #[tokio::test]
    async fn test_add_listener_starts_polling() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let (tx, _rx) = mpsc::channel(4);
        let registry = Arc::new(PollerRegistry::new(
            Arc::new(MockFeedClient::default()),
            PollerSettings::default(),
            tx,
        ));
        let cancel = CancelToken::new();
        let bot = Bot::new(store.clone(), cancel.clone()).with_registry(registry.clone());
        let handler = Handler::new(Arc::new(bot));

        let options = options();
        let reply = handler
            .handle_add_listener(Some(GuildId::new(7)), ChannelId::new(42), borrowed(&options))
            .await;

        assert!(reply.success, "{}", reply.message);
        assert_eq!(registry.len(), 1);
        let watched = store.subreddits_with_rules(&cancel).await.unwrap();
        assert_eq!(watched.len(), 1);
        let poller = registry.get(watched[0].id).unwrap();
        assert_eq!(poller.source(), "rust");
        assert!(poller.is_running());
        registry.stop_all();
    }

    #[tokio::test]
    async fn test_add_listener_reports_bad_field() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let handler = Handler::new(Arc::new(Bot::new(store, CancelToken::new())));

        let options = vec![
            ("subreddit", CommandDataOptionValue::String("rust".into())),
            ("match_on", CommandDataOptionValue::String("flair".into())),
            ("value", CommandDataOptionValue::String("news".into())),
        ];
        let reply = handler
            .handle_add_listener(Some(GuildId::new(7)), ChannelId::new(42), borrowed(&options))
            .await;

        assert!(!reply.success);
        assert!(reply.message.contains("flair"));
    }
}
