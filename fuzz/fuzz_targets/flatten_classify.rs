#![no_main]
use libfuzzer_sys::fuzz_target;
use schema_variety::{map_document, Flattener, Value};

fuzz_target!(|data: &[u8]| {
    let value: Value = match serde_json::from_slice(data) {
        Ok(v) => v,
        Err(_) => return,
    };
    if let Some(doc) = value.as_map() {
        let _ = map_document(doc, &Flattener::default());
        let _ = map_document(doc, &Flattener::new(0).exclude_prefix("_"));
    }
});
