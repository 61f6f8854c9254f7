use mirrorchat_store::DocumentId;

/// Visual speaker of a bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BubbleRole {
    User,
    Assistant,
}

impl BubbleRole {
    /// Class name a view applies to the bubble row.
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Render request for one chat bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub role: BubbleRole,
    pub content: String,
    /// Record the bubble was rendered from. Only primary bubbles carry it.
    pub source: Option<DocumentId>,
}

impl Bubble {
    /// Primary bubble for a user record, tagged with its record id.
    pub fn user(source: DocumentId, content: impl Into<String>) -> Self {
        Self {
            role: BubbleRole::User,
            content: content.into(),
            source: Some(source),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: BubbleRole::Assistant,
            content: content.into(),
            source: None,
        }
    }
}
