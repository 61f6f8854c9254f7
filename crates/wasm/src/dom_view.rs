use mirrorchat_widget::{Bubble, Placement, ViewSurface, WidgetError, WidgetResult};
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, Node, ScrollBehavior, ScrollToOptions};

/// Chat container element the reconciler renders into.
///
/// Every bubble is a `div.message-row.<role>` wrapping `div.message-bubble.<role>-bubble`
/// wrapping a `p`. Primary rows carry the record id in `data-msg-id`.
pub struct DomView {
    document: Document,
    container: Element,
}

impl DomView {
    pub fn new(document: Document, container: Element) -> Self {
        Self {
            document,
            container,
        }
    }

    pub fn from_id(document: &Document, container_id: &str) -> Result<Self, JsValue> {
        let container = document.get_element_by_id(container_id).ok_or_else(|| {
            JsValue::from_str(&format!("chat container #{container_id} not found"))
        })?;
        Ok(Self::new(document.clone(), container))
    }

    fn build_row(&self, bubble: &Bubble) -> Result<Element, JsValue> {
        let role = bubble.role.class_name();

        let row = self.document.create_element("div")?;
        row.set_class_name(&format!("message-row {role}"));
        if let Some(source) = &bubble.source {
            row.set_attribute("data-msg-id", source.as_str())?;
        }

        let body = self.document.create_element("div")?;
        body.set_class_name(&format!("message-bubble {role}-bubble"));

        let paragraph = self.document.create_element("p")?;
        paragraph.set_text_content(Some(&bubble.content));

        body.append_child(&paragraph)?;
        row.append_child(&body)?;
        Ok(row)
    }
}

impl ViewSurface for DomView {
    type Handle = Element;

    fn mount(&mut self, bubble: &Bubble, placement: Placement<'_, Element>) -> WidgetResult<Element> {
        let row = self
            .build_row(bubble)
            .map_err(|error| WidgetError::mount("dom-build-row", format!("{error:?}")))?;

        let attached = match placement {
            Placement::End => self.container.append_child(&row),
            Placement::After(anchor) => self
                .container
                .insert_before(&row, anchor.next_sibling().as_ref()),
        };
        attached.map_err(|error| WidgetError::mount("dom-attach-row", format!("{error:?}")))?;
        Ok(row)
    }

    fn is_mounted(&self, handle: &Element) -> bool {
        let container: &Node = self.container.as_ref();
        handle.parent_node().as_ref() == Some(container)
    }

    fn scroll_to_bottom(&mut self) {
        let options = ScrollToOptions::new();
        options.set_top(f64::from(self.container.scroll_height()));
        options.set_behavior(ScrollBehavior::Smooth);
        self.container.scroll_to_with_scroll_to_options(&options);
    }
}
