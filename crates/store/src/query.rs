use serde::{Deserialize, Serialize};

use super::types::{DEFAULT_COLLECTION, DEFAULT_ORDER_KEY, MessageSnapshot};

/// Case-insensitive equality filter on a single snapshot field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub equals: String,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, snapshot: &MessageSnapshot) -> bool {
        snapshot
            .field(&self.field)
            .is_some_and(|value| value.eq_ignore_ascii_case(&self.equals))
    }
}

/// Live query a subscriber registers with a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    pub collection: String,
    #[serde(default)]
    pub filter: Option<FieldFilter>,
    #[serde(default = "default_order_key")]
    pub order_key: String,
}

impl SubscriptionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_key: default_order_key(),
        }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ordered_by(mut self, order_key: impl Into<String>) -> Self {
        self.order_key = order_key.into();
        self
    }

    pub fn matches(&self, snapshot: &MessageSnapshot) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.matches(snapshot))
    }
}

impl Default for SubscriptionQuery {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION)
    }
}

fn default_order_key() -> String {
    DEFAULT_ORDER_KEY.to_string()
}
