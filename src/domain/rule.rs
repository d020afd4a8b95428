use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::SpyError;
use crate::domain::Item;

/// Which part of a post a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetField {
    Author,
    Title,
}

impl TargetField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::Author => "author",
            TargetField::Title => "title",
        }
    }

    pub fn select<'a>(&self, item: &'a Item) -> &'a str {
        match self {
            TargetField::Author => &item.author,
            TargetField::Title => &item.title,
        }
    }
}

impl FromStr for TargetField {
    type Err = SpyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "author" => Ok(TargetField::Author),
            "title" => Ok(TargetField::Title),
            other => Err(SpyError::UnknownTargetField(other.to_string())),
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Partial,
}

impl MatchMode {
    pub fn from_exact(exact: bool) -> Self {
        if exact {
            MatchMode::Exact
        } else {
            MatchMode::Partial
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, MatchMode::Exact)
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Exact => f.write_str("exact"),
            MatchMode::Partial => f.write_str("partial"),
        }
    }
}

/// A stored rule.
///
/// The selector is kept as the raw stored text: rows written by older
/// versions or by hand may hold values this build does not understand, and
/// those must only disable the rule, not the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub target_field: String,
    pub target_value: String,
    pub exact: bool,
    pub subreddit_id: i64,
    pub channel_id: i64,
    pub server_id: i64,
}

impl Rule {
    pub fn field(&self) -> Result<TargetField, SpyError> {
        self.target_field.parse()
    }

    pub fn mode(&self) -> MatchMode {
        MatchMode::from_exact(self.exact)
    }
}

/// A rule that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub target_field: TargetField,
    pub target_value: String,
    pub mode: MatchMode,
    pub subreddit_id: i64,
    pub channel_id: i64,
    pub server_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(field: &str) -> Rule {
        Rule {
            id: 1,
            target_field: field.into(),
            target_value: "x".into(),
            exact: true,
            subreddit_id: 1,
            channel_id: 1,
            server_id: 1,
        }
    }

    #[test]
    fn test_target_field_parse() {
        assert_eq!("author".parse::<TargetField>().unwrap(), TargetField::Author);
        assert_eq!("Title".parse::<TargetField>().unwrap(), TargetField::Title);
        assert!(matches!(
            "flair".parse::<TargetField>(),
            Err(SpyError::UnknownTargetField(f)) if f == "flair"
        ));
    }

    #[test]
    fn test_target_field_select() {
        let mut item = Item::new("rust", "a1");
        item.author = "ferris".into();
        item.title = "Hello".into();
        assert_eq!(TargetField::Author.select(&item), "ferris");
        assert_eq!(TargetField::Title.select(&item), "Hello");
    }

    #[test]
    fn test_rule_field_reports_unknown_selector() {
        assert_eq!(rule("title").field().unwrap(), TargetField::Title);
        assert!(rule("body").field().is_err());
    }

    #[test]
    fn test_mode_from_exact_flag() {
        assert_eq!(MatchMode::from_exact(true), MatchMode::Exact);
        assert_eq!(MatchMode::from_exact(false), MatchMode::Partial);
        assert_eq!(MatchMode::Partial.to_string(), "partial");
    }
}
