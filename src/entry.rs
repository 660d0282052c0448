//! Structured entries extracted from personal-record documents.
//!
//! An [`Entry`] is a loose field/value mapping: experience items, projects,
//! patents and certifications all share the same shape and only differ in
//! which conventional keys they carry (`title`, `company`, `skills`, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserialize, Deserializer};
use serde::{Serialize, Serializer};

/// A single field value inside an [`Entry`].
///
/// Values are scalar text or an ordered list of text. `Null` keeps the
/// distinction between "present but empty" and "absent" that extractors
/// sometimes produce.
///
/// Deserialization is lenient: JSON numbers and booleans become their text
/// form, so a stored `"year": 2019` is read as `Text("2019")` and written
/// back as `"year": "2019"`. The numeric type is not preserved. Objects
/// are kept as their JSON text.
///
/// # Examples
///
/// ```
/// use dossier::FieldValue;
///
/// let title = FieldValue::from("Staff Engineer");
/// let skills = FieldValue::from(vec!["Rust", "SQL"]);
///
/// assert_eq!(title.as_text(), Some("Staff Engineer"));
/// assert_eq!(skills.as_list().map(<[String]>::len), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// Scalar text.
    Text(String),
    /// Ordered list of text, such as skills.
    List(Vec<String>),
    /// Explicit null; skipped by comparison, never overwrites.
    Null,
}

impl FieldValue {
    /// Returns the text if this is a scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the items if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::List(v) => write!(f, "{}", v.join(", ")),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(v: Vec<&str>) -> Self {
        Self::List(v.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Text(v) => serializer.serialize_str(v),
            Self::List(v) => v.serialize(serializer),
            Self::Null => serializer.serialize_none(),
        }
    }
}

fn scalar_text(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

// Extractors and hand-edited store files are not strict about scalar types
// (a patent `year` is often a bare number), so anything that is not a string
// or a list is coerced to its JSON text.
impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde_json::Value;

        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::Null => Self::Null,
            Value::Array(items) => Self::List(items.into_iter().filter_map(scalar_text).collect()),
            other => scalar_text(other).map_or(Self::Null, Self::Text),
        })
    }
}

/// A structured record: experience item, project, patent or certification.
///
/// Fields are kept in key order, so two entries with the same keys and
/// values are equal regardless of the order in which fields were inserted.
///
/// # Examples
///
/// ```
/// use dossier::Entry;
///
/// let a = Entry::new().with("title", "A").with("company", "B");
/// let b = Entry::new().with("company", "B").with("title", "A");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Entry {
    fields: BTreeMap<String, FieldValue>,
}

impl Entry {
    /// Conventional key holding the entry's capture time.
    pub const TIMESTAMP: &'static str = "timestamp";

    /// Creates an empty entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this entry with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(key.into(), value.into())
    }

    /// Returns the value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Returns the text value of `key`, if it is present and scalar.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_text)
    }

    /// Returns the list value of `key`, if it is present and a list.
    #[must_use]
    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).and_then(FieldValue::as_list)
    }

    /// Returns true if `key` is present, null included.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the entry has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Joins every non-null value into one line of text.
    ///
    /// Used when an entry must be reduced to a single label (for example a
    /// certification without a `title`).
    #[must_use]
    pub fn display_text(&self) -> String {
        self.fields
            .values()
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Entry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Entry {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
