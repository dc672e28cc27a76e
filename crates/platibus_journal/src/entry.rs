use std::collections::HashSet;

use chrono::{DateTime, Utc};
use platibus_message::Message;
use serde::{Deserialize, Serialize};

use crate::position::JournalPosition;

/// What the bus was doing with a message when it was journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JournalCategory {
    Sent,
    Received,
    Published,
}

impl JournalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalCategory::Sent => "Sent",
            JournalCategory::Received => "Received",
            JournalCategory::Published => "Published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("sent") {
            Some(JournalCategory::Sent)
        } else if value.eq_ignore_ascii_case("received") {
            Some(JournalCategory::Received)
        } else if value.eq_ignore_ascii_case("published") {
            Some(JournalCategory::Published)
        } else {
            None
        }
    }
}

/// One journaled message, as returned by a read.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub position: JournalPosition,
    pub timestamp: DateTime<Utc>,
    pub category: JournalCategory,
    pub message: Message,
}

/// Read filter. An empty category or topic set leaves that dimension
/// unrestricted; populated sets combine conjunctively.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub categories: HashSet<JournalCategory>,
    pub topics: HashSet<String>,
}

impl JournalFilter {
    pub fn categories(categories: impl IntoIterator<Item = JournalCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn topics(topics: impl IntoIterator<Item = String>) -> Self {
        Self {
            topics: topics.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn matches(&self, category: JournalCategory, topic: Option<&str>) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&category) {
            return false;
        }
        if !self.topics.is_empty() {
            return matches!(topic, Some(t) if self.topics.contains(t));
        }
        true
    }
}
