//! Canonical JSON serialization and content-derived document ids.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a tree to its canonical byte form: UTF-8, compact, object
/// keys in ascending order at every level. Equal trees always produce
/// equal bytes, which makes the derived ids content-stable.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // serde_json handles the string escaping rules.
                out.extend_from_slice(
                    serde_json::to_string(key)
                        .unwrap_or_else(|_| "\"\"".into())
                        .as_bytes(),
                );
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => {
            out.extend_from_slice(
                serde_json::to_string(scalar)
                    .unwrap_or_else(|_| "null".into())
                    .as_bytes(),
            );
        }
    }
}

/// Content-derived document id:
/// `doc_<UTC %Y%m%d%H%M%S>_<first 12 hex of sha256(canonical)>`.
/// The alphabet stays inside `[a-z0-9_]` so ids double as table-name
/// suffixes.
pub fn doc_id(canonical: &[u8], now: DateTime<Utc>) -> String {
    let digest = hex::encode(Sha256::digest(canonical));
    format!("doc_{}_{}", now.format("%Y%m%d%H%M%S"), &digest[..12])
}
