use js_sys::{Array, Function, Promise};
use mirrorchat_store::{ChangeBatch, ChangeEvent, DocumentId, NewMessage, StoreError, StoreResult};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    /// Host-provided store client.
    ///
    /// `subscribe(collection, orderKey, onBatch)` calls `onBatch` with arrays of
    /// `{kind, id, data}` where `data.timestamp` is epoch milliseconds.
    /// `insert(collection, record)` resolves to the new record id.
    pub type JsStoreClient;

    #[wasm_bindgen(method, catch)]
    fn subscribe(
        this: &JsStoreClient,
        collection: &str,
        order_key: &str,
        on_batch: &Function,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = insert)]
    fn insert_record(
        this: &JsStoreClient,
        collection: &str,
        record: JsValue,
    ) -> Result<Promise, JsValue>;

    /// Optional; a missing property means ordered delivery.
    #[wasm_bindgen(method, getter, js_name = deliversInOrder)]
    fn delivers_in_order_flag(this: &JsStoreClient) -> Option<bool>;
}

impl JsStoreClient {
    pub fn delivers_in_order(&self) -> bool {
        self.delivers_in_order_flag().unwrap_or(true)
    }

    /// Registers `on_batch` for the lifetime of the page. The returned value is whatever the
    /// client hands back, usually an unsubscribe function.
    pub fn listen(
        &self,
        collection: &str,
        order_key: &str,
        on_batch: &Function,
    ) -> StoreResult<JsValue> {
        self.subscribe(collection, order_key, on_batch)
            .map_err(|error| StoreError::rejected("js-subscribe", describe(&error)))
    }

    pub async fn insert(&self, collection: &str, record: &NewMessage) -> StoreResult<DocumentId> {
        let record = serde_wasm_bindgen::to_value(record)
            .map_err(|error| StoreError::rejected("js-encode-record", error.to_string()))?;
        let promise = self
            .insert_record(collection, record)
            .map_err(|error| StoreError::rejected("js-insert-call", describe(&error)))?;
        let id = JsFuture::from(promise)
            .await
            .map_err(|error| StoreError::rejected("js-insert", describe(&error)))?;

        let raw = id.as_string().ok_or_else(|| {
            StoreError::rejected("js-insert-id", format!("expected a string id, got {id:?}"))
        })?;
        DocumentId::parse(&raw)
    }
}

/// Decodes a JS batch, dropping entries that are not change events.
pub fn decode_batch(value: JsValue) -> ChangeBatch {
    let Ok(events) = value.dyn_into::<Array>() else {
        log::warn!("change batch is not an array; ignoring it");
        return ChangeBatch::default();
    };

    events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            serde_wasm_bindgen::from_value::<ChangeEvent>(event)
                .inspect_err(|error| log::warn!("skipping malformed change event #{index}: {error}"))
                .ok()
        })
        .collect()
}

fn describe(error: &JsValue) -> String {
    error
        .as_string()
        .or_else(|| {
            error
                .dyn_ref::<js_sys::Error>()
                .map(|error| String::from(error.message()))
        })
        .unwrap_or_else(|| format!("{error:?}"))
}
