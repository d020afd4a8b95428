use std::sync::Arc;

use tracing::{error, info};

use crate::app::{CancelToken, Result, SpyError};
use crate::domain::{MatchMode, NewRule, Rule, Subreddit, TargetField};
use crate::poller::PollerRegistry;
use crate::store::RuleStore;

/// The "create rule" command as it arrives from a chat command or the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRequest {
    pub subreddit: String,
    pub server: String,
    pub channel: String,
    pub target_field: String,
    pub value: String,
    pub exact: bool,
}

/// Reply shown to whoever issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    /// Reply for a stored rule.
    pub fn created(rule: &Rule, subreddit: &Subreddit, channel: &str) -> Self {
        Self {
            success: true,
            message: format!(
                "Rule {} created: r/{} posts whose {} {} \"{}\" go to channel {}",
                rule.id,
                subreddit.external_id,
                rule.target_field,
                if rule.exact { "is" } else { "contains" },
                rule.target_value,
                channel.trim(),
            ),
        }
    }

    /// Reply for a failed command. Store and network failures are logged
    /// and answered generically; validation failures are shown as they are.
    pub fn failed(error: &SpyError) -> Self {
        let message = if error.is_infrastructure() {
            error!(error = %error, "command failed");
            "Failed to create rule, try again later".to_string()
        } else {
            format!("Failed to create rule: {}", error)
        };
        Self {
            success: false,
            message,
        }
    }
}

/// Command handlers. With a registry attached, creating a rule for a new
/// subreddit also starts polling it.
pub struct Bot {
    store: Arc<dyn RuleStore>,
    registry: Option<Arc<PollerRegistry>>,
    cancel: CancelToken,
}

impl Bot {
    pub fn new(store: Arc<dyn RuleStore>, cancel: CancelToken) -> Self {
        Self {
            store,
            registry: None,
            cancel,
        }
    }

    pub fn with_registry(mut self, registry: Arc<PollerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Store a rule, creating its server, channel and subreddit on demand.
    pub async fn create_rule(&self, request: &RuleRequest) -> Result<(Rule, Subreddit)> {
        let target_field: TargetField = request.target_field.parse()?;
        let value = request.value.trim();
        if value.is_empty() {
            return Err(SpyError::InvalidRule("match value must not be empty".into()));
        }

        let server = self
            .store
            .resolve_or_create_server(&self.cancel, &request.server)
            .await?;
        let channel = self
            .store
            .resolve_or_create_channel(&self.cancel, &request.channel, server.id)
            .await?;
        let subreddit = self
            .store
            .resolve_or_create_subreddit(&self.cancel, &request.subreddit)
            .await?;

        let rule = self
            .store
            .insert_rule(
                &self.cancel,
                &NewRule {
                    target_field,
                    target_value: value.to_string(),
                    mode: MatchMode::from_exact(request.exact),
                    subreddit_id: subreddit.id,
                    channel_id: channel.id,
                    server_id: server.id,
                },
            )
            .await?;

        if let Some(ref registry) = self.registry {
            registry.add(&subreddit);
        }

        info!(
            rule_id = rule.id,
            subreddit = %subreddit.external_id,
            channel = %channel.external_id,
            field = %target_field,
            "rule created"
        );
        Ok((rule, subreddit))
    }

    /// [`Bot::create_rule`] with the outcome turned into a user-facing reply.
    pub async fn handle_create_rule(&self, request: &RuleRequest) -> CommandResponse {
        match self.create_rule(request).await {
            Ok((rule, subreddit)) => CommandResponse::created(&rule, &subreddit, &request.channel),
            Err(e) => CommandResponse::failed(&e),
        }
    }
}
