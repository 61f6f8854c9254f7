use std::fmt::Write as _;

use snafu::OptionExt;

use crate::bubble::Bubble;
use crate::error::{MountSnafu, WidgetResult};
use crate::view::{Placement, ViewSurface};

/// Handle of a node mounted in a [`MemoryView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryNode {
    pub id: NodeId,
    pub bubble: Bubble,
}

/// Ordered in-memory view surface for headless hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryView {
    children: Vec<MemoryNode>,
    next_node: u64,
    scroll_count: usize,
    fail_next_mount: bool,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(&self) -> &[MemoryNode] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn scroll_count(&self) -> usize {
        self.scroll_count
    }

    pub fn position_of(&self, node: NodeId) -> Option<usize> {
        self.children.iter().position(|child| child.id == node)
    }

    /// Removes a node as if something outside the widget pruned it.
    pub fn detach(&mut self, node: NodeId) -> Option<MemoryNode> {
        let index = self.position_of(node)?;
        Some(self.children.remove(index))
    }

    /// Makes the next mount fail once.
    pub fn fail_next_mount(&mut self) {
        self.fail_next_mount = true;
    }

    /// One `[role] content` line per child, in view order.
    pub fn render_transcript(&self) -> String {
        let mut transcript = String::new();
        for child in &self.children {
            let _ = writeln!(
                transcript,
                "[{}] {}",
                child.bubble.role.class_name(),
                child.bubble.content
            );
        }
        transcript
    }
}

impl ViewSurface for MemoryView {
    type Handle = NodeId;

    fn mount(&mut self, bubble: &Bubble, placement: Placement<'_, NodeId>) -> WidgetResult<NodeId> {
        if std::mem::take(&mut self.fail_next_mount) {
            return MountSnafu {
                stage: "memory-view-mount",
                details: "mount failure requested".to_string(),
            }
            .fail();
        }

        let index = match placement {
            Placement::End => self.children.len(),
            Placement::After(anchor) => {
                self.position_of(*anchor).context(MountSnafu {
                    stage: "memory-view-find-anchor",
                    details: format!("anchor node {anchor:?} is not mounted"),
                })? + 1
            }
        };

        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.children.insert(
            index,
            MemoryNode {
                id,
                bubble: bubble.clone(),
            },
        );
        Ok(id)
    }

    fn is_mounted(&self, handle: &NodeId) -> bool {
        self.position_of(*handle).is_some()
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounting_after_an_anchor_inserts_directly_behind_it() {
        let mut view = MemoryView::new();
        let first = view.mount(&Bubble::assistant("a"), Placement::End).unwrap();
        let _second = view.mount(&Bubble::assistant("b"), Placement::End).unwrap();
        let inserted = view
            .mount(&Bubble::assistant("a2"), Placement::After(&first))
            .unwrap();

        assert_eq!(view.position_of(inserted), Some(1));
        assert_eq!(view.render_transcript(), "[assistant] a\n[assistant] a2\n[assistant] b\n");
    }

    #[test]
    fn detached_anchors_are_reported_and_rejected() {
        let mut view = MemoryView::new();
        let anchor = view.mount(&Bubble::assistant("a"), Placement::End).unwrap();
        assert!(view.detach(anchor).is_some());
        assert!(!view.is_mounted(&anchor));

        let error = view
            .mount(&Bubble::assistant("b"), Placement::After(&anchor))
            .unwrap_err();
        assert!(error.to_string().contains("not mounted"));
    }

    #[test]
    fn requested_failures_affect_exactly_one_mount() {
        let mut view = MemoryView::new();
        view.fail_next_mount();

        assert!(view.mount(&Bubble::assistant("a"), Placement::End).is_err());
        assert!(view.mount(&Bubble::assistant("b"), Placement::End).is_ok());
        assert_eq!(view.len(), 1);
    }
}
