//! Canonical JSON serialization helpers.
//!
//! Serializes structures with sorted object keys and stable formatting so
//! model artifacts can be hashed and compared byte-for-byte.

use serde::ser::Error as _;
use serde::Serialize;
use serde_json::{map::Map, ser::PrettyFormatter, Serializer, Value};
use std::io::Write;

/// Rebuild `value` with every object's keys in byte order, at any depth.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, inner)| (key, canonicalize(inner)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        scalar => scalar,
    }
}

/// Write `value` as canonical JSON: sorted keys, two-space indentation.
pub fn write_canonical_json<T, W>(writer: W, value: &T) -> Result<(), serde_json::Error>
where
    T: Serialize,
    W: Write,
{
    let mut serializer = Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"  "));
    canonicalize(serde_json::to_value(value)?).serialize(&mut serializer)
}

/// Canonical JSON as a `String`
pub fn canonical_json_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut buffer = Vec::new();
    write_canonical_json(&mut buffer, value)?;
    String::from_utf8(buffer).map_err(|err| serde_json::Error::custom(err.to_string()))
}

/// Hex-encoded BLAKE3 digest of arbitrary bytes.
pub fn blake3_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}
