use mirrorchat_store::{DEFAULT_COLLECTION, DEFAULT_ORDER_KEY, SubscriptionQuery};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTAINER_ID: &str = "chat-box";
pub const DEFAULT_INPUT_ID: &str = "user-input";
pub const DEFAULT_SEND_BUTTON_ID: &str = "send-btn";

/// Where the widget reads records from and which page elements it binds to.
///
/// Field names also accept their camelCase spelling for settings passed in from JS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub collection: String,
    #[serde(alias = "orderKey")]
    pub order_key: String,
    #[serde(alias = "containerId")]
    pub container_id: String,
    #[serde(alias = "inputId")]
    pub input_id: String,
    #[serde(alias = "sendButtonId")]
    pub send_button_id: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            order_key: DEFAULT_ORDER_KEY.to_string(),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            input_id: DEFAULT_INPUT_ID.to_string(),
            send_button_id: DEFAULT_SEND_BUTTON_ID.to_string(),
        }
    }
}

impl WidgetSettings {
    /// Trims every field and restores blank ones to their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        normalize_field(&mut self.collection, defaults.collection);
        normalize_field(&mut self.order_key, defaults.order_key);
        normalize_field(&mut self.container_id, defaults.container_id);
        normalize_field(&mut self.input_id, defaults.input_id);
        normalize_field(&mut self.send_button_id, defaults.send_button_id);
        self
    }

    /// Unfiltered live query over the configured collection.
    pub fn query(&self) -> SubscriptionQuery {
        SubscriptionQuery::new(self.collection.clone()).ordered_by(self.order_key.clone())
    }
}

fn normalize_field(value: &mut String, fallback: String) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_restores_blank_fields() {
        let settings = WidgetSettings {
            collection: "  chats ".to_string(),
            order_key: " ".to_string(),
            container_id: String::new(),
            ..WidgetSettings::default()
        }
        .normalized();

        assert_eq!(settings.collection, "chats");
        assert_eq!(settings.order_key, "timestamp");
        assert_eq!(settings.container_id, "chat-box");
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: WidgetSettings =
            serde_json::from_str(r#"{"collection":"support","sendButtonId":"go"}"#).unwrap();

        assert_eq!(settings.collection, "support");
        assert_eq!(settings.send_button_id, "go");
        assert_eq!(settings.input_id, "user-input");
    }

    #[test]
    fn query_uses_collection_and_order_key() {
        let query = WidgetSettings::default().query();
        assert_eq!(query.collection, "messages");
        assert_eq!(query.order_key, "timestamp");
        assert!(query.filter.is_none());
    }
}
