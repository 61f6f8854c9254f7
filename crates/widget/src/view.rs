use crate::bubble::Bubble;
use crate::error::WidgetResult;

/// Where a new bubble goes relative to the existing children.
#[derive(Debug)]
pub enum Placement<'a, H> {
    End,
    After(&'a H),
}

/// Scrollable, ordered container of bubbles the reconciler mutates.
///
/// Handles are lookup keys only; the view owns its nodes.
pub trait ViewSurface {
    type Handle: Clone;

    fn mount(
        &mut self,
        bubble: &Bubble,
        placement: Placement<'_, Self::Handle>,
    ) -> WidgetResult<Self::Handle>;

    /// Whether the node is still a direct child of the container.
    fn is_mounted(&self, handle: &Self::Handle) -> bool;

    fn scroll_to_bottom(&mut self);
}
