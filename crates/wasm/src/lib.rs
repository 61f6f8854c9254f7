mod bridge;
mod dom_view;

use std::cell::RefCell;
use std::rc::Rc;

use mirrorchat_store::Timestamp;
use mirrorchat_widget::{BatchQueue, Composer, KeyAction, Reconciler, SendOutcome, WidgetSettings};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::{Document, HtmlInputElement, KeyboardEvent};

pub use bridge::JsStoreClient;
pub use dom_view::DomView;

/// Initialize WASM module
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("MirrorChat WASM module initialized");
}

/// Summary of the batches one `applyBatch` call rendered.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    rendered: usize,
    duplicates: usize,
    ignored: usize,
    failures: usize,
}

struct WidgetState {
    client: JsStoreClient,
    settings: WidgetSettings,
    batches: BatchQueue<DomView>,
    composer: RefCell<Composer>,
    input: HtmlInputElement,
}

impl WidgetState {
    /// `None` when the batch arrived mid-render; the running delivery applies it next.
    fn apply(&self, batch: JsValue) -> Option<BatchSummary> {
        let mut batch = bridge::decode_batch(batch);
        if !self.client.delivers_in_order() {
            batch.sort_by_order_key(&self.settings.order_key);
        }

        let report = self.batches.deliver(batch)?;
        Some(BatchSummary {
            rendered: report.rendered(),
            duplicates: report.duplicates,
            ignored: report.ignored,
            failures: report.failures,
        })
    }

    async fn send(&self) -> SendOutcome {
        let pending = {
            let mut composer = self.composer.borrow_mut();
            composer.set_draft(self.input.value());
            composer.begin_send(Timestamp::now())
        };
        let Some(pending) = pending else {
            return SendOutcome::Skipped;
        };

        let result = self
            .client
            .insert(&pending.collection, &pending.record)
            .await;
        let outcome = self.composer.borrow_mut().finish(pending, result);
        if matches!(outcome, SendOutcome::Sent(_)) {
            self.input.set_value(self.composer.borrow().draft());
        }
        outcome
    }
}

/// Chat widget bound to page elements and a host store client.
#[wasm_bindgen]
pub struct ChatWidget {
    state: Rc<WidgetState>,
}

#[wasm_bindgen]
impl ChatWidget {
    /// `settings` may be `undefined` or a partial object; missing fields use the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(client: JsStoreClient, settings: JsValue) -> Result<ChatWidget, JsValue> {
        let settings = if settings.is_undefined() || settings.is_null() {
            WidgetSettings::default()
        } else {
            serde_wasm_bindgen::from_value::<WidgetSettings>(settings)?
        }
        .normalized();

        let document = page_document()?;
        let view = DomView::from_id(&document, &settings.container_id)?;
        let input = document
            .get_element_by_id(&settings.input_id)
            .ok_or_else(|| missing_element(&settings.input_id))?
            .dyn_into::<HtmlInputElement>()
            .map_err(|_| JsValue::from_str(&format!("#{} is not an input", settings.input_id)))?;

        log::info!(
            "chat widget bound to #{} in collection '{}'",
            settings.container_id,
            settings.collection
        );

        Ok(Self {
            state: Rc::new(WidgetState {
                client,
                composer: RefCell::new(Composer::new(settings.collection.clone())),
                batches: BatchQueue::new(Reconciler::new(view)),
                input,
                settings,
            }),
        })
    }

    /// Starts the subscription and wires the send button and the Enter key.
    ///
    /// Listeners live as long as the page.
    pub fn attach(&self) -> Result<(), JsValue> {
        let document = page_document()?;
        let settings = &self.state.settings;

        let state = Rc::clone(&self.state);
        let on_batch = Closure::<dyn FnMut(JsValue)>::new(move |batch: JsValue| {
            state.apply(batch);
        });
        self.state
            .client
            .listen(&settings.collection, &settings.order_key, on_batch.as_ref().unchecked_ref())
            .map_err(|error| JsValue::from_str(&error.to_string()))?;
        on_batch.forget();

        let button = document
            .get_element_by_id(&settings.send_button_id)
            .ok_or_else(|| missing_element(&settings.send_button_id))?;
        let state = Rc::clone(&self.state);
        let on_click = Closure::<dyn FnMut()>::new(move || {
            let state = Rc::clone(&state);
            spawn_local(async move {
                state.send().await;
            });
        });
        button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
        on_click.forget();

        let state = Rc::clone(&self.state);
        let on_key = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if KeyAction::classify(&event.key(), event.shift_key()) != KeyAction::Submit {
                return;
            }
            event.prevent_default();
            let state = Rc::clone(&state);
            spawn_local(async move {
                state.send().await;
            });
        });
        self.state
            .input
            .add_event_listener_with_callback("keydown", on_key.as_ref().unchecked_ref())?;
        on_key.forget();

        Ok(())
    }

    /// Sends the current input value. Resolves to `"sent"`, `"skipped"` or `"failed"`.
    pub fn send(&self) -> js_sys::Promise {
        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            let outcome = match state.send().await {
                SendOutcome::Sent(_) => "sent",
                SendOutcome::Skipped => "skipped",
                SendOutcome::Failed => "failed",
            };
            Ok(JsValue::from_str(outcome))
        })
    }

    /// Applies a batch delivered outside `attach`, e.g. by a host that owns the subscription.
    /// Returns `null` when the batch was queued behind one that is still rendering.
    #[wasm_bindgen(js_name = applyBatch)]
    pub fn apply_batch(&self, batch: JsValue) -> Result<JsValue, JsValue> {
        match self.state.apply(batch) {
            Some(summary) => Ok(serde_wasm_bindgen::to_value(&summary)?),
            None => Ok(JsValue::NULL),
        }
    }
}

fn page_document() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document available"))
}

fn missing_element(id: &str) -> JsValue {
    JsValue::from_str(&format!("element #{id} not found"))
}
