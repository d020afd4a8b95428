use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::info;

use crate::app::{CancelToken, Result};
use crate::domain::Subreddit;
use crate::fetcher::FeedClient;
use crate::poller::{Batch, Poller, PollerSettings};
use crate::store::RuleStore;

/// The set of active pollers, at most one per subreddit.
///
/// Shared by startup seeding, the resync tick and rule creation; every
/// lookup and insertion goes through the one lock.
pub struct PollerRegistry {
    pollers: Mutex<HashMap<i64, Arc<Poller>>>,
    client: Arc<dyn FeedClient + Send + Sync>,
    settings: PollerSettings,
    output: mpsc::Sender<Batch>,
}

impl PollerRegistry {
    pub fn new(
        client: Arc<dyn FeedClient + Send + Sync>,
        settings: PollerSettings,
        output: mpsc::Sender<Batch>,
    ) -> Self {
        Self {
            pollers: Mutex::new(HashMap::new()),
            client,
            settings,
            output,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Arc<Poller>>> {
        self.pollers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the poller for `subreddit`, creating and starting it if the
    /// source is not tracked yet.
    pub fn add(&self, subreddit: &Subreddit) -> Arc<Poller> {
        let mut pollers = self.lock();
        if let Some(existing) = pollers.get(&subreddit.id) {
            return existing.clone();
        }

        let poller = Arc::new(Poller::new(
            &subreddit.external_id,
            self.settings.listing_url(&subreddit.external_id),
            self.settings.interval,
            self.settings.timeout,
            self.client.clone(),
        ));
        poller.start(self.output.clone());
        pollers.insert(subreddit.id, poller.clone());
        poller
    }

    pub fn get(&self, subreddit_id: i64) -> Option<Arc<Poller>> {
        self.lock().get(&subreddit_id).cloned()
    }

    /// Stop and forget a single poller, leaving the others running.
    pub fn remove(&self, subreddit_id: i64) -> Option<Arc<Poller>> {
        let removed = self.lock().remove(&subreddit_id);
        if let Some(ref poller) = removed {
            poller.stop();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stop_all(&self) {
        for poller in self.lock().values() {
            poller.stop();
        }
    }

    /// Ensure every subreddit with a rule has a poller. Returns how many
    /// were newly started.
    pub async fn sync(&self, store: &dyn RuleStore, cancel: &CancelToken) -> Result<usize> {
        let subreddits = store.subreddits_with_rules(cancel).await?;
        let before = self.len();
        for subreddit in &subreddits {
            self.add(subreddit);
        }
        let added = self.len().saturating_sub(before);
        if added > 0 {
            info!(added, total = self.len(), "registered pollers");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{Item, MatchMode, TargetField};
    use crate::evaluator::Evaluator;
    use crate::store::SqliteStore;
    use crate::testing::{seed_rule, MockFeedClient};

    fn registry(client: Arc<MockFeedClient>) -> (PollerRegistry, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(10);
        (PollerRegistry::new(client, PollerSettings::default(), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_is_idempotent_per_source() {
        let client = Arc::new(MockFeedClient::with_items(vec![]));
        let (registry, _rx) = registry(client.clone());
        let subreddit = Subreddit::new(7, "rust");

        let first = registry.add(&subreddit);
        let second = registry.add(&subreddit);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        // One schedule means one fetch per interval.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(client.calls(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.calls(), 2);
        registry.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_uses_listing_url() {
        let client = Arc::new(MockFeedClient::with_items(vec![]));
        let (registry, _rx) = registry(client.clone());

        let poller = registry.add(&Subreddit::new(1, "rust"));
        assert_eq!(poller.url(), "https://www.reddit.com/r/rust/.json");
        assert_eq!(poller.source(), "rust");

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            client.urls(),
            vec!["https://www.reddit.com/r/rust/.json".to_string()]
        );
        registry.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_stops_only_that_poller() {
        let client = Arc::new(MockFeedClient::with_items(vec![]));
        let (registry, _rx) = registry(client.clone());

        let rust = registry.add(&Subreddit::new(1, "rust"));
        let golang = registry.add(&Subreddit::new(2, "golang"));

        let removed = registry.remove(1).unwrap();
        assert!(Arc::ptr_eq(&removed, &rust));
        assert!(rust.is_stopped());
        assert!(!golang.is_stopped());
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());
        assert!(registry.remove(1).is_none());

        registry.stop_all();
        assert!(golang.is_stopped());
    }

    #[tokio::test]
    async fn test_sync_adds_missing_sources_once() {
        let client = Arc::new(MockFeedClient::with_items(vec![]));
        let (registry, _rx) = registry(client.clone());
        let store = SqliteStore::in_memory().unwrap();
        let cancel = CancelToken::new();

        seed_rule(&store, "rust", "c1", TargetField::Title, "a", MatchMode::Partial).await;
        seed_rule(&store, "golang", "c1", TargetField::Title, "a", MatchMode::Partial).await;

        assert_eq!(registry.sync(&store, &cancel).await.unwrap(), 2);
        assert_eq!(registry.sync(&store, &cancel).await.unwrap(), 0);

        seed_rule(&store, "zig", "c2", TargetField::Author, "b", MatchMode::Exact).await;
        assert_eq!(registry.sync(&store, &cancel).await.unwrap(), 1);
        assert_eq!(registry.len(), 3);
        registry.stop_all();
    }

    #[tokio::test]
    async fn test_sync_skips_subreddits_without_rules() {
        let client = Arc::new(MockFeedClient::with_items(vec![]));
        let (registry, _rx) = registry(client.clone());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cancel = CancelToken::new();
        let all = seed_rule(&store, "all", "c1", TargetField::Title, "launch", MatchMode::Partial).await;

        // A batch from r/all names many other subreddits; evaluating it
        // records them without giving them rules.
        let evaluator = Evaluator::new(store.clone(), cancel.clone());
        let batch: Vec<Item> = ["pics", "news", "funny", "gaming"]
            .iter()
            .map(|source| {
                let mut item = Item::new(source, &format!("{}-1", source));
                item.title = "nothing to see".into();
                item
            })
            .collect();
        let (tx, _results) = mpsc::channel(16);
        let summary = evaluator.evaluate(batch, &tx).await.unwrap();
        assert_eq!(summary.matches, 0);

        assert_eq!(registry.sync(store.as_ref(), &cancel).await.unwrap(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(all.subreddit.id).is_some());
        registry.stop_all();
    }
}
