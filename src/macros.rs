/// Build a [`Value`](crate::Value) from a JSON literal.
///
/// The literal uses `serde_json`'s `json!` syntax and is then read through the host's extended
/// JSON, so a `{"$date": ...}`, `{"$oid": ...}`, `{"$binary": ...}` or `{"$undefined": true}`
/// member becomes the matching special value. Object keys keep the order they are written in.
///
/// ```
/// # use schema_variety::{doc, Value};
/// let value = doc!({
///     "_id": { "$oid": "5331a4c0e4b0a0a1b2c3d4e5" },
///     "name": "First Post",
///     "tags": ["first", "test"],
///     "meta": { "views": 10, "parent": null }
/// });
/// assert!(value["_id"].is_object_id());
/// assert_eq!(value["meta"]["views"], Value::Int(10));
/// ```
///
/// Anything that serializes to the host format can be interpolated, including the crate's own
/// value types:
///
/// ```
/// # use schema_variety::{doc, Binary, Timestamp, Value};
/// let value = doc!({
///     "when": Timestamp::from_sec(1_393_632_000),
///     "blob": Binary::new(0x03, vec![0u8; 16]),
///     "missing": Value::Undefined,
/// });
/// assert!(value["when"].is_timestamp());
/// assert!(value["missing"].is_undefined());
/// ```
///
/// Panics if a spelled-out special member is malformed, such as `{"$oid": "xyz"}`.
#[macro_export]
macro_rules! doc {
    ($($json:tt)+) => {
        match $crate::Value::from_json($crate::__serde_json::json!($($json)+)) {
            ::std::result::Result::Ok(value) => value,
            ::std::result::Result::Err(err) => {
                ::std::panic!("malformed document literal: {}", err)
            }
        }
    };
}
