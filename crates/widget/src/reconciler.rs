use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;

use mirrorchat_store::{ChangeBatch, ChangeEvent, ChangeKind, DocumentId, MessageRole, MessageSnapshot, MessageStatus};

use crate::bubble::Bubble;
use crate::view::{Placement, ViewSurface};

/// Rendering progress of one record as observed by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    Unseen,
    PrimaryRendered,
    RepliedRendered,
}

/// Visible effect of applying one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applied {
    /// A user bubble was appended for a newly added record.
    UserBubble,
    /// An assistant record written directly to the store was appended.
    AssistantBubble,
    /// A reply bubble was inserted right after its primary bubble.
    ReplyAnchored,
    /// A reply bubble was appended because its primary bubble is not mounted.
    ReplyAppended,
    /// The event repeats a transition that was already rendered.
    Duplicate,
    /// The event carries nothing to render.
    Ignored,
    /// The view refused the bubble; see the warning log.
    Failed,
}

/// Per-batch tally of [`Applied`] outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub user_bubbles: usize,
    pub assistant_bubbles: usize,
    pub replies_anchored: usize,
    pub replies_appended: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub failures: usize,
}

impl BatchReport {
    pub fn record(&mut self, applied: Applied) {
        match applied {
            Applied::UserBubble => self.user_bubbles += 1,
            Applied::AssistantBubble => self.assistant_bubbles += 1,
            Applied::ReplyAnchored => self.replies_anchored += 1,
            Applied::ReplyAppended => self.replies_appended += 1,
            Applied::Duplicate => self.duplicates += 1,
            Applied::Ignored => self.ignored += 1,
            Applied::Failed => self.failures += 1,
        }
    }

    /// Number of bubbles mounted while applying the batch.
    pub fn rendered(&self) -> usize {
        self.user_bubbles + self.assistant_bubbles + self.replies_anchored + self.replies_appended
    }
}

impl AddAssign for BatchReport {
    fn add_assign(&mut self, other: Self) {
        self.user_bubbles += other.user_bubbles;
        self.assistant_bubbles += other.assistant_bubbles;
        self.replies_anchored += other.replies_anchored;
        self.replies_appended += other.replies_appended;
        self.duplicates += other.duplicates;
        self.ignored += other.ignored;
        self.failures += other.failures;
    }
}

/// Turns a live stream of record changes into duplicate-free view mutations.
///
/// Every record id yields at most one primary bubble and at most one reply bubble no matter
/// how often the store re-delivers it. The rendered-id sets only grow for the lifetime of the
/// reconciler.
///
/// Events are applied strictly in the order given. Ordering across the subscription is the
/// store's responsibility (see `MessageStore::delivers_in_order`).
pub struct Reconciler<V: ViewSurface> {
    view: V,
    rendered_primary: HashSet<DocumentId>,
    rendered_reply: HashSet<DocumentId>,
    primary_nodes: HashMap<DocumentId, V::Handle>,
}

impl<V: ViewSurface> Reconciler<V> {
    pub fn new(view: V) -> Self {
        Self {
            view,
            rendered_primary: HashSet::new(),
            rendered_reply: HashSet::new(),
            primary_nodes: HashMap::new(),
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }

    pub fn record_state(&self, id: &DocumentId) -> RecordState {
        if self.rendered_reply.contains(id) {
            RecordState::RepliedRendered
        } else if self.rendered_primary.contains(id) {
            RecordState::PrimaryRendered
        } else {
            RecordState::Unseen
        }
    }

    /// Handle of the primary bubble rendered for `id`, if it mounted.
    pub fn primary_handle(&self, id: &DocumentId) -> Option<&V::Handle> {
        self.primary_nodes.get(id)
    }

    /// Applies a batch in delivery order. A failing event never stops the rest of the batch.
    pub fn apply_batch(&mut self, batch: &ChangeBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for event in batch {
            report.record(self.apply_event(event));
        }

        tracing::debug!(
            events = batch.len(),
            rendered = report.rendered(),
            duplicates = report.duplicates,
            failures = report.failures,
            "applied change batch"
        );
        report
    }

    pub fn apply_event(&mut self, event: &ChangeEvent) -> Applied {
        match event.kind {
            ChangeKind::Added => self.apply_added(&event.id, &event.snapshot),
            ChangeKind::Modified => self.apply_modified(&event.id, &event.snapshot),
            ChangeKind::Removed => {
                // Records are append/modify-only; rendered bubbles stay in place.
                tracing::trace!(id = %event.id, "ignoring removed record");
                Applied::Ignored
            }
        }
    }

    fn apply_added(&mut self, id: &DocumentId, snapshot: &MessageSnapshot) -> Applied {
        if !self.rendered_primary.insert(id.clone()) {
            return Applied::Duplicate;
        }

        let role = snapshot.role();
        if role == MessageRole::User.as_str() {
            // Blank user text still renders an (empty) bubble.
            let bubble = Bubble::user(id.clone(), snapshot.text());
            return match self.view.mount(&bubble, Placement::End) {
                Ok(handle) => {
                    self.primary_nodes.insert(id.clone(), handle);
                    self.view.scroll_to_bottom();
                    Applied::UserBubble
                }
                Err(error) => {
                    tracing::warn!(id = %id, error = %error, "failed to mount user bubble");
                    Applied::Failed
                }
            };
        }

        if role == MessageRole::Assistant.as_str()
            && let Some(content) = first_non_empty(snapshot.reply(), snapshot.text())
        {
            let bubble = Bubble::assistant(content);
            return match self.view.mount(&bubble, Placement::End) {
                Ok(_) => {
                    self.view.scroll_to_bottom();
                    self.rendered_reply.insert(id.clone());
                    Applied::AssistantBubble
                }
                Err(error) => {
                    tracing::warn!(id = %id, error = %error, "failed to mount assistant bubble");
                    Applied::Failed
                }
            };
        }

        tracing::trace!(id = %id, role = %role, "added record has nothing to render");
        Applied::Ignored
    }

    fn apply_modified(&mut self, id: &DocumentId, snapshot: &MessageSnapshot) -> Applied {
        let reply = snapshot.reply();
        if snapshot.status() != MessageStatus::Replied.as_str() || reply.is_empty() {
            return Applied::Ignored;
        }

        if !self.rendered_reply.insert(id.clone()) {
            return Applied::Duplicate;
        }

        let bubble = Bubble::assistant(reply);
        let anchor = self
            .primary_nodes
            .get(id)
            .filter(|handle| self.view.is_mounted(handle))
            .cloned();

        let (placement, applied) = match &anchor {
            Some(handle) => (Placement::After(handle), Applied::ReplyAnchored),
            None => {
                tracing::debug!(id = %id, "primary bubble not mounted; appending reply");
                (Placement::End, Applied::ReplyAppended)
            }
        };

        match self.view.mount(&bubble, placement) {
            Ok(_) => {
                self.view.scroll_to_bottom();
                applied
            }
            Err(error) => {
                tracing::warn!(id = %id, error = %error, "failed to mount reply bubble");
                Applied::Failed
            }
        }
    }
}

fn first_non_empty<'a>(primary: &'a str, fallback: &'a str) -> Option<&'a str> {
    [primary, fallback].into_iter().find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use mirrorchat_store::Timestamp;

    use super::*;
    use crate::memory_view::MemoryView;

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    fn user_added(raw: &str, text: &str) -> ChangeEvent {
        ChangeEvent::added(
            id(raw),
            MessageSnapshot {
                text: Some(text.to_string()),
                role: Some("user".to_string()),
                status: Some("pending".to_string()),
                timestamp: Some(Timestamp::from_millis(1)),
                ..MessageSnapshot::default()
            },
        )
    }

    fn replied(raw: &str, reply: &str) -> ChangeEvent {
        ChangeEvent::modified(
            id(raw),
            MessageSnapshot {
                text: Some("original".to_string()),
                role: Some("assistant".to_string()),
                status: Some("replied".to_string()),
                reply: Some(reply.to_string()),
                ..MessageSnapshot::default()
            },
        )
    }

    fn contents(reconciler: &Reconciler<MemoryView>) -> Vec<(&'static str, String)> {
        reconciler
            .view()
            .children()
            .iter()
            .map(|node| (node.bubble.role.class_name(), node.bubble.content.clone()))
            .collect()
    }

    #[test]
    fn user_then_reply_scenario() {
        let mut reconciler = Reconciler::new(MemoryView::new());

        let report = reconciler.apply_batch(&ChangeBatch::single(user_added("1", "Hi")));
        assert_eq!(report.user_bubbles, 1);
        assert_eq!(contents(&reconciler), vec![("user", "Hi".to_string())]);
        assert_eq!(reconciler.record_state(&id("1")), RecordState::PrimaryRendered);

        let report = reconciler.apply_batch(&ChangeBatch::single(replied("1", "Hello!")));
        assert_eq!(report.replies_anchored, 1);
        assert_eq!(
            contents(&reconciler),
            vec![("user", "Hi".to_string()), ("assistant", "Hello!".to_string())]
        );
        assert_eq!(reconciler.record_state(&id("1")), RecordState::RepliedRendered);
    }

    #[test]
    fn duplicate_added_events_render_one_primary_bubble() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        let batch = ChangeBatch::new(vec![user_added("1", "Hi"), user_added("1", "Hi")]);

        let report = reconciler.apply_batch(&batch);
        reconciler.apply_batch(&batch);

        assert_eq!(report.user_bubbles, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(reconciler.view().len(), 1);
    }

    #[test]
    fn duplicate_replied_events_render_one_reply_bubble() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));

        assert_eq!(reconciler.apply_event(&replied("1", "Hello!")), Applied::ReplyAnchored);
        assert_eq!(reconciler.apply_event(&replied("1", "Hello!")), Applied::Duplicate);
        assert_eq!(reconciler.view().len(), 2);
    }

    #[test]
    fn reply_is_the_next_sibling_of_its_primary_bubble() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_batch(&ChangeBatch::new(vec![
            user_added("1", "first"),
            user_added("2", "second"),
            user_added("3", "third"),
        ]));

        reconciler.apply_event(&replied("1", "reply to first"));

        let primary = *reconciler.primary_handle(&id("1")).unwrap();
        let primary_index = reconciler.view().position_of(primary).unwrap();
        let children = reconciler.view().children();
        assert_eq!(children[primary_index + 1].bubble.content, "reply to first");
        assert_eq!(children[primary_index + 2].bubble.content, "second");
    }

    #[test]
    fn reply_without_primary_is_appended() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));

        assert_eq!(reconciler.apply_event(&replied("9", "orphan")), Applied::ReplyAppended);
        assert_eq!(
            contents(&reconciler).last(),
            Some(&("assistant", "orphan".to_string()))
        );
    }

    #[test]
    fn reply_falls_back_to_append_when_primary_was_pruned() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));
        reconciler.apply_event(&user_added("2", "there"));
        let primary = *reconciler.primary_handle(&id("1")).unwrap();
        reconciler.view_mut().detach(primary);

        assert_eq!(reconciler.apply_event(&replied("1", "late")), Applied::ReplyAppended);
        assert_eq!(
            contents(&reconciler),
            vec![("user", "there".to_string()), ("assistant", "late".to_string())]
        );
    }

    #[test]
    fn direct_assistant_record_suppresses_later_reply() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        let assistant = ChangeEvent::added(
            id("a"),
            MessageSnapshot {
                role: Some("Assistant".to_string()),
                reply: Some("hello".to_string()),
                ..MessageSnapshot::default()
            },
        );

        assert_eq!(reconciler.apply_event(&assistant), Applied::AssistantBubble);
        assert_eq!(reconciler.record_state(&id("a")), RecordState::RepliedRendered);
        assert_eq!(reconciler.apply_event(&replied("a", "hello")), Applied::Duplicate);
        assert_eq!(contents(&reconciler), vec![("assistant", "hello".to_string())]);
    }

    #[test]
    fn assistant_record_falls_back_to_text_when_reply_is_empty() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        let assistant = ChangeEvent::added(
            id("a"),
            MessageSnapshot {
                role: Some("assistant".to_string()),
                reply: Some(String::new()),
                text: Some("from text".to_string()),
                ..MessageSnapshot::default()
            },
        );

        reconciler.apply_event(&assistant);
        assert_eq!(contents(&reconciler), vec![("assistant", "from text".to_string())]);
    }

    #[test]
    fn empty_assistant_and_roleless_records_render_nothing() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        let empty_assistant = ChangeEvent::added(
            id("a"),
            MessageSnapshot {
                role: Some("assistant".to_string()),
                ..MessageSnapshot::default()
            },
        );
        let roleless = ChangeEvent::added(id("b"), MessageSnapshot::default());

        assert_eq!(reconciler.apply_event(&empty_assistant), Applied::Ignored);
        assert_eq!(reconciler.apply_event(&roleless), Applied::Ignored);
        assert!(reconciler.view().is_empty());
        // The added transition is still consumed, so a re-delivery is a duplicate.
        assert_eq!(reconciler.record_state(&id("b")), RecordState::PrimaryRendered);
        assert_eq!(reconciler.apply_event(&roleless), Applied::Duplicate);
    }

    #[test]
    fn blank_user_text_still_renders_a_bubble() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        assert_eq!(reconciler.apply_event(&user_added("1", "")), Applied::UserBubble);
        assert_eq!(contents(&reconciler), vec![("user", String::new())]);
    }

    #[test]
    fn modified_events_need_replied_status_and_reply_text() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));

        let pending = ChangeEvent::modified(
            id("1"),
            MessageSnapshot {
                status: Some("pending".to_string()),
                reply: Some("early".to_string()),
                ..MessageSnapshot::default()
            },
        );
        let empty_reply = replied("1", "");

        assert_eq!(reconciler.apply_event(&pending), Applied::Ignored);
        assert_eq!(reconciler.apply_event(&empty_reply), Applied::Ignored);
        assert_eq!(reconciler.record_state(&id("1")), RecordState::PrimaryRendered);

        let shouted = ChangeEvent::modified(
            id("1"),
            MessageSnapshot {
                status: Some("REPLIED".to_string()),
                reply: Some("done".to_string()),
                ..MessageSnapshot::default()
            },
        );
        assert_eq!(reconciler.apply_event(&shouted), Applied::ReplyAnchored);
    }

    #[test]
    fn removed_events_leave_bubbles_in_place() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));

        let removed = ChangeEvent::removed(id("1"), MessageSnapshot::default());
        assert_eq!(reconciler.apply_event(&removed), Applied::Ignored);
        assert_eq!(reconciler.view().len(), 1);
    }

    #[test]
    fn a_failed_mount_does_not_block_the_rest_of_the_batch() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.view_mut().fail_next_mount();

        let report = reconciler.apply_batch(&ChangeBatch::new(vec![
            user_added("1", "lost"),
            user_added("2", "kept"),
            replied("1", "reply to lost"),
        ]));

        assert_eq!(report.failures, 1);
        assert_eq!(report.user_bubbles, 1);
        assert_eq!(report.replies_appended, 1);
        assert_eq!(
            contents(&reconciler),
            vec![("user", "kept".to_string()), ("assistant", "reply to lost".to_string())]
        );
    }

    #[test]
    fn every_mounted_bubble_scrolls_to_bottom() {
        let mut reconciler = Reconciler::new(MemoryView::new());
        reconciler.apply_event(&user_added("1", "Hi"));
        reconciler.apply_event(&replied("1", "Hello!"));
        reconciler.apply_event(&replied("1", "Hello!"));

        assert_eq!(reconciler.view().scroll_count(), 2);
    }

    #[test]
    fn appended_replies_and_assistant_records_scroll_too() {
        let mut reconciler = Reconciler::new(MemoryView::new());

        assert_eq!(
            reconciler.apply_event(&replied("orphan", "Late")),
            Applied::ReplyAppended
        );
        assert_eq!(reconciler.view().scroll_count(), 1);

        let assistant = ChangeEvent::added(
            id("a"),
            MessageSnapshot {
                role: Some("assistant".to_string()),
                reply: Some("Welcome".to_string()),
                ..MessageSnapshot::default()
            },
        );
        assert_eq!(
            reconciler.apply_event(&assistant),
            Applied::AssistantBubble
        );
        assert_eq!(reconciler.view().scroll_count(), 2);

        reconciler.view_mut().fail_next_mount();
        reconciler.apply_event(&user_added("u", "Hi"));
        assert_eq!(reconciler.view().scroll_count(), 2);
    }

    #[test]
    fn independent_reconcilers_do_not_share_state() {
        let mut left = Reconciler::new(MemoryView::new());
        let mut right = Reconciler::new(MemoryView::new());
        let event = user_added("1", "Hi");

        assert_eq!(left.apply_event(&event), Applied::UserBubble);
        assert_eq!(right.apply_event(&event), Applied::UserBubble);
    }
}
