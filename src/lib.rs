//! # reddit-spy
//!
//! Watches subreddits and posts a Discord notification whenever a new post
//! matches one of the stored rules.
//!
//! ## Architecture
//!
//! ```text
//! Poller → (batch channel) → Evaluator → (match channel) → Dispatcher → Messenger
//! ```
//!
//! Each subreddit with at least one rule has its own [`poller`]. The
//! [`evaluator`] checks every post of a batch against the subreddit's rules,
//! and the [`dispatcher`] delivers each match at most once per
//! (post, channel, rule), using the [`store`] as the record of what was sent.
//! The [`orchestrator`] wires the stages together and handles shutdown, and
//! the [`gateway`] lets Discord users add rules while the daemon runs.
//!
//! ## Quick Start
//!
//! ```bash
//! # Notify channel 42 about r/rust posts whose title mentions "release"
//! reddit-spy rule add rust release --server 1 --channel 42
//!
//! # List rules
//! reddit-spy rule list rust
//!
//! # Start polling
//! DISCORD_TOKEN=... reddit-spy run
//! ```

/// Application context, command handlers, cancellation and error handling.
///
/// The [`AppContext`](app::AppContext) struct bundles config, store and the
/// cancellation token; [`Bot`](app::Bot) implements rule creation.
pub mod app;

/// Command-line interface using clap.
///
/// - `run` - Run the notification pipeline
/// - `rule add` - Add a rule
/// - `rule list <subreddit>` - List a subreddit's rules
/// - `subreddits` - List watched subreddits
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/reddit-spy/config.toml`.
pub mod config;

/// Idempotent delivery of matches and message rendering.
pub mod dispatcher;

/// Core domain models: posts, rules, reference entities, delivery records.
pub mod domain;

/// Rule evaluation over item batches on a bounded worker pool.
pub mod evaluator;

/// Discord gateway session serving the `add_subreddit_listener` command.
pub mod gateway;

/// Listing fetch and decoding.
///
/// - [`FeedClient`](fetcher::FeedClient): Async trait for listing fetches
/// - [`HttpFeedClient`](fetcher::HttpFeedClient): reqwest-based implementation
pub mod fetcher;

/// Outbound chat delivery.
pub mod messenger;

/// Pipeline wiring, the main select loop and signal handling.
pub mod orchestrator;

/// Per-subreddit fixed-rate pollers and their registry.
pub mod poller;

/// SQLite persistence layer.
///
/// - [`RuleStore`](store::RuleStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

#[cfg(test)]
mod testing;
