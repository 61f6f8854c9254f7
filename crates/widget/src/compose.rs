use mirrorchat_store::{DocumentId, MessageStore, NewMessage, StoreResult, Timestamp};

/// What a key press in the input field should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    Newline,
    Ignore,
}

impl KeyAction {
    /// Enter submits, Shift+Enter keeps editing.
    pub fn classify(key: &str, shift: bool) -> Self {
        if !key.eq_ignore_ascii_case("enter") {
            return Self::Ignore;
        }
        if shift { Self::Newline } else { Self::Submit }
    }
}

/// Insert prepared by [`Composer::begin_send`] and not yet acknowledged by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub collection: String,
    pub record: NewMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The draft trimmed to nothing; no write was attempted.
    Skipped,
    Sent(DocumentId),
    /// The store rejected the write; the draft is kept.
    Failed,
}

/// Draft state of the input field plus the send path.
#[derive(Debug, Clone)]
pub struct Composer {
    collection: String,
    draft: String,
}

impl Composer {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            draft: String::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Builds the user record for the current draft, or `None` when it trims to empty.
    pub fn begin_send(&self, now: Timestamp) -> Option<PendingSend> {
        let text = self.draft.trim();
        if text.is_empty() {
            return None;
        }

        Some(PendingSend {
            collection: self.collection.clone(),
            record: NewMessage::user(text, now),
        })
    }

    /// Settles a send: the draft is cleared on success and kept on failure.
    pub fn finish(&mut self, pending: PendingSend, result: StoreResult<DocumentId>) -> SendOutcome {
        match result {
            Ok(id) => {
                tracing::debug!(id = %id, collection = %pending.collection, "sent user message");
                self.draft.clear();
                SendOutcome::Sent(id)
            }
            Err(error) => {
                tracing::error!(
                    collection = %pending.collection,
                    stage = error.stage(),
                    error = %error,
                    "failed to send message"
                );
                SendOutcome::Failed
            }
        }
    }

    pub async fn send(&mut self, store: &dyn MessageStore) -> SendOutcome {
        let Some(pending) = self.begin_send(Timestamp::now()) else {
            return SendOutcome::Skipped;
        };

        let result = store.insert(&pending.collection, pending.record.clone()).await;
        self.finish(pending, result)
    }
}
