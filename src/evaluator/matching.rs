use crate::app::Result;
use crate::domain::{Item, MatchMode, Rule};

/// Case-insensitive full-string equality.
pub fn evaluate_exact(value: &str, expected: &str) -> bool {
    value.to_lowercase() == expected.to_lowercase()
}

/// Case-insensitive substring containment.
pub fn evaluate_partial(value: &str, expected: &str) -> bool {
    value.to_lowercase().contains(&expected.to_lowercase())
}

/// Whether `rule` fires for `item`. Fails only when the rule's selector is
/// not one this build understands.
pub fn matches(rule: &Rule, item: &Item) -> Result<bool> {
    let value = rule.field()?.select(item);
    Ok(match rule.mode() {
        MatchMode::Exact => evaluate_exact(value, &rule.target_value),
        MatchMode::Partial => evaluate_partial(value, &rule.target_value),
    })
}
