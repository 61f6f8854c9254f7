use std::fmt;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Default collection the chat widget mirrors.
pub const DEFAULT_COLLECTION: &str = "messages";
/// Default creation-order key used to sort subscriptions.
pub const DEFAULT_ORDER_KEY: &str = "timestamp";

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0_i64, |duration| {
                i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
            });
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

/// Author of a message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Case-insensitive parse of a raw role field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Processing status of a message record.
///
/// Unknown statuses are preserved verbatim (lowercased) so agents can use their own values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageStatus {
    Pending,
    Replied,
    Error,
    Other(String),
}

impl MessageStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "replied" => Self::Replied,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Replied => "replied",
            Self::Error => "error",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for MessageStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<MessageStatus> for String {
    fn from(value: MessageStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Field snapshot of a message record as delivered by a subscription.
///
/// Every field is optional and non-string values are treated as absent, so a malformed
/// document degrades to empty fields instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageSnapshot {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MessageSnapshot {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn reply(&self) -> &str {
        self.reply.as_deref().unwrap_or_default()
    }

    /// Lowercased role field, empty when absent.
    pub fn role(&self) -> String {
        self.role.as_deref().unwrap_or_default().to_lowercase()
    }

    /// Lowercased status field, empty when absent.
    pub fn status(&self) -> String {
        self.status.as_deref().unwrap_or_default().to_lowercase()
    }

    pub fn message_role(&self) -> Option<MessageRole> {
        self.role.as_deref().and_then(MessageRole::parse)
    }

    pub fn message_status(&self) -> Option<MessageStatus> {
        self.status.as_deref().map(MessageStatus::parse)
    }

    /// Raw string value of a named field, used by query filters and ordering.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "text" => self.text.as_deref(),
            "role" => self.role.as_deref(),
            "status" => self.status.as_deref(),
            "reply" => self.reply.as_deref(),
            "error_message" => self.error_message.as_deref(),
            _ => None,
        }
    }

    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(reply) = &patch.reply {
            self.reply = Some(reply.clone());
        }
        if let Some(status) = &patch.status {
            self.status = Some(status.as_str().to_string());
        }
        if let Some(role) = patch.role {
            self.role = Some(role.as_str().to_string());
        }
        if let Some(error_message) = &patch.error_message {
            self.error_message = Some(error_message.clone());
        }
    }
}

/// Typed payload for inserting a new message record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub text: String,
    pub role: MessageRole,
    pub status: MessageStatus,
    pub timestamp: Timestamp,
}

impl NewMessage {
    /// Builds the pending record produced by a user send.
    pub fn user(text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            text: text.into(),
            role: MessageRole::User,
            status: MessageStatus::Pending,
            timestamp,
        }
    }

    pub fn into_snapshot(self) -> MessageSnapshot {
        MessageSnapshot {
            text: Some(self.text),
            role: Some(self.role.as_str().to_string()),
            status: Some(self.status.as_str().to_string()),
            reply: None,
            timestamp: Some(self.timestamp),
            error_message: None,
        }
    }
}

/// Partial update written into an existing record, typically by a reply agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MessagePatch {
    /// Patch an agent writes once it has produced a reply.
    pub fn replied(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            status: Some(MessageStatus::Replied),
            role: Some(MessageRole::Assistant),
            error_message: None,
        }
    }

    /// Patch an agent writes when it failed to produce a reply.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            reply: None,
            status: Some(MessageStatus::Error),
            role: None,
            error_message: Some(error_message.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientText {
    Text(String),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientTimestamp {
    Millis(i64),
    Fractional(f64),
    Other(IgnoredAny),
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientText>::deserialize(deserializer)? {
        Some(LenientText::Text(text)) => Some(text),
        Some(LenientText::Other(_)) | None => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientTimestamp>::deserialize(deserializer)? {
        Some(LenientTimestamp::Millis(millis)) => Some(Timestamp(millis)),
        Some(LenientTimestamp::Fractional(millis)) if millis.is_finite() => {
            Some(Timestamp(millis as i64))
        }
        Some(LenientTimestamp::Fractional(_)) | Some(LenientTimestamp::Other(_)) | None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_accessors_are_case_insensitive() {
        let snapshot = MessageSnapshot {
            role: Some("User".to_string()),
            status: Some("REPLIED".to_string()),
            ..MessageSnapshot::default()
        };

        assert_eq!(snapshot.role(), "user");
        assert_eq!(snapshot.status(), "replied");
        assert_eq!(snapshot.message_role(), Some(MessageRole::User));
        assert_eq!(snapshot.message_status(), Some(MessageStatus::Replied));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let snapshot = MessageSnapshot::default();
        assert_eq!(snapshot.text(), "");
        assert_eq!(snapshot.reply(), "");
        assert_eq!(snapshot.role(), "");
        assert_eq!(snapshot.status(), "");
    }

    #[test]
    fn malformed_fields_are_treated_as_absent() {
        let snapshot: MessageSnapshot = serde_json::from_str(
            r#"{"text": 42, "role": "user", "status": null, "reply": {"nested": true},
                "timestamp": "yesterday", "conv_id": "ignored"}"#,
        )
        .unwrap();

        assert_eq!(snapshot.text, None);
        assert_eq!(snapshot.role.as_deref(), Some("user"));
        assert_eq!(snapshot.status, None);
        assert_eq!(snapshot.reply, None);
        assert_eq!(snapshot.timestamp, None);
    }

    #[test]
    fn fractional_timestamps_are_truncated_to_millis() {
        let snapshot: MessageSnapshot =
            serde_json::from_str(r#"{"timestamp": 1700000000123.9}"#).unwrap();
        assert_eq!(snapshot.timestamp, Some(Timestamp(1_700_000_000_123)));
    }

    #[test]
    fn unknown_statuses_survive_a_round_trip_lowercased() {
        let status = MessageStatus::parse("Queued");
        assert_eq!(status, MessageStatus::Other("queued".to_string()));
        assert_eq!(String::from(status), "queued");
    }

    #[test]
    fn user_record_serializes_with_lowercase_wire_names() {
        let record = NewMessage::user("Hi", Timestamp::from_millis(5));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"text": "Hi", "role": "user", "status": "pending", "timestamp": 5})
        );
    }

    #[test]
    fn replied_patch_flips_status_and_role() {
        let mut snapshot = NewMessage::user("Hi", Timestamp::from_millis(1)).into_snapshot();
        snapshot.apply(&MessagePatch::replied("Hello!"));

        assert_eq!(snapshot.status(), "replied");
        assert_eq!(snapshot.role(), "assistant");
        assert_eq!(snapshot.reply(), "Hello!");
        assert_eq!(snapshot.text(), "Hi");
    }
}
