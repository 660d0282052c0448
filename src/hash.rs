//! Content fingerprints.
//!
//! Fingerprints are blake3 digests over a canonical encoding, so they are
//! stable across processes and independent of field insertion order.

use std::fmt;

use blake3::Hasher;
use serde::Serialize;

use crate::entry::{Entry, FieldValue};

const ENTRY_DOMAIN: &[u8] = b"dossier.entry.v1";

/// Shortest content id `content_id` will produce.
pub const MIN_ID_LENGTH: usize = 8;

/// Longest content id (a full blake3 digest in hex).
pub const MAX_ID_LENGTH: usize = 64;

/// A 256-bit fingerprint of an [`Entry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

fn update_str(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

fn update_value(h: &mut Hasher, value: &FieldValue) {
    match value {
        FieldValue::Text(s) => {
            h.update(&[1]);
            update_str(h, s);
        }
        FieldValue::List(items) => {
            h.update(&[2]);
            h.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                update_str(h, item);
            }
        }
        FieldValue::Null => {
            h.update(&[0]);
        }
    }
}

fn write_canonical_json(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical_json(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical hashing over entries and staged payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Fingerprints an entry.
    ///
    /// Fields are visited in key order and every key and value is length
    /// prefixed, so no two distinct entries share an encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use dossier::{ContentHasher, Entry};
    ///
    /// let a = Entry::new().with("title", "A").with("company", "B");
    /// let b = Entry::new().with("company", "B").with("title", "A");
    /// assert_eq!(ContentHasher::fingerprint(&a), ContentHasher::fingerprint(&b));
    /// ```
    #[must_use]
    pub fn fingerprint(entry: &Entry) -> Fingerprint {
        let mut h = Hasher::new();
        h.update(ENTRY_DOMAIN);
        h.update(&(entry.len() as u64).to_le_bytes());
        for (key, value) in entry {
            update_str(&mut h, key);
            update_value(&mut h, value);
        }
        Fingerprint(*h.finalize().as_bytes())
    }

    /// Serializes `value` as JSON with every object's keys sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
        let tree = serde_json::to_value(value)?;
        let mut out = String::new();
        write_canonical_json(&tree, &mut out);
        Ok(out)
    }

    /// Derives a short content-addressed identifier for `value`.
    ///
    /// The identifier is the first `length` hex characters of the blake3
    /// digest of the canonical JSON; `length` is clamped to
    /// [`MIN_ID_LENGTH`]..=[`MAX_ID_LENGTH`].
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn content_id<T: Serialize>(value: &T, length: usize) -> Result<String, serde_json::Error> {
        let canonical = Self::canonical_json(value)?;
        let digest = blake3::hash(canonical.as_bytes()).to_hex();
        let length = length.clamp(MIN_ID_LENGTH, MAX_ID_LENGTH);
        Ok(digest[..length].to_string())
    }
}
