//! Rule evaluation.
//!
//! Every (item, rule) pair of a batch is checked on its own task, bounded by
//! a semaphore, and the batch is complete only once all pairs have been
//! joined. Rule lookup for every source happens before any pair runs, so a
//! store failure aborts the batch without emitting partial results.

pub mod matching;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, warn};

use crate::app::{CancelToken, Result};
use crate::domain::{Item, MatchResult, Rule};
use crate::store::RuleStore;

pub use matching::{evaluate_exact, evaluate_partial, matches};

pub const DEFAULT_WORKERS: usize = 10;

/// Counters for one evaluated batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub items: usize,
    pub pairs: usize,
    pub matches: usize,
    pub skipped: usize,
}

enum PairOutcome {
    Match,
    NoMatch,
    Skipped,
}

pub struct Evaluator {
    store: Arc<dyn RuleStore>,
    cancel: CancelToken,
    semaphore: Arc<Semaphore>,
}

impl Evaluator {
    pub fn new(store: Arc<dyn RuleStore>, cancel: CancelToken) -> Self {
        Self::with_workers(store, cancel, DEFAULT_WORKERS)
    }

    pub fn with_workers(store: Arc<dyn RuleStore>, cancel: CancelToken, workers: usize) -> Self {
        Self {
            store,
            cancel,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Evaluate one batch, sending a [`MatchResult`] per positive match.
    pub async fn evaluate(
        &self,
        batch: Vec<Item>,
        results: &mpsc::Sender<MatchResult>,
    ) -> Result<EvaluationSummary> {
        let mut summary = EvaluationSummary {
            items: batch.len(),
            ..Default::default()
        };

        let mut by_source: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        for item in batch {
            let key = item.source_key();
            if key.is_empty() {
                warn!(post = %item.external_id, "item has no source, skipping");
                summary.skipped += 1;
                continue;
            }
            by_source.entry(key).or_default().push(item);
        }

        let mut work = Vec::with_capacity(by_source.len());
        for (source, items) in by_source {
            let subreddit = self
                .store
                .resolve_or_create_subreddit(&self.cancel, &source)
                .await?;
            let rules = self
                .store
                .rules_for_subreddit(&self.cancel, subreddit.id)
                .await?;
            debug!(source = %source, items = items.len(), rules = rules.len(), "resolved rules");
            work.push((subreddit.id, items, rules));
        }

        let mut handles = Vec::new();
        for (subreddit_id, items, rules) in work {
            let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
            for item in items {
                let item = Arc::new(item);
                for rule in &rules {
                    let store = self.store.clone();
                    let cancel = self.cancel.clone();
                    let semaphore = self.semaphore.clone();
                    let results = results.clone();
                    let item = item.clone();
                    let rule = rule.clone();

                    handles.push(tokio::spawn(async move {
                        let Ok(_permit) = semaphore.acquire().await else {
                            return PairOutcome::Skipped;
                        };
                        evaluate_pair(store.as_ref(), &cancel, subreddit_id, &item, &rule, &results)
                            .await
                    }));
                }
            }
        }

        summary.pairs = handles.len();
        for handle in futures::future::join_all(handles).await {
            match handle {
                Ok(PairOutcome::Match) => summary.matches += 1,
                Ok(PairOutcome::NoMatch) => {}
                Ok(PairOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("Task join error: {}", e);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}

async fn evaluate_pair(
    store: &dyn RuleStore,
    cancel: &CancelToken,
    subreddit_id: i64,
    item: &Item,
    rule: &Rule,
    results: &mpsc::Sender<MatchResult>,
) -> PairOutcome {
    let matched = match matches(rule, item) {
        Ok(matched) => matched,
        Err(e) => {
            debug!(rule_id = rule.id, error = %e, "skipping rule");
            return PairOutcome::Skipped;
        }
    };
    if !matched {
        return PairOutcome::NoMatch;
    }

    let item_id = match store.resolve_or_create_item(cancel, item, subreddit_id).await {
        Ok(id) => id,
        Err(e) => {
            warn!(rule_id = rule.id, post = %item.external_id, error = %e, "failed to record matched item");
            return PairOutcome::Skipped;
        }
    };

    let result = MatchResult {
        rule_id: rule.id,
        channel_id: rule.channel_id,
        item_id,
        item: item.clone(),
    };
    if results.send(result).await.is_err() {
        debug!(rule_id = rule.id, "result channel closed");
        return PairOutcome::Skipped;
    }
    PairOutcome::Match
}
