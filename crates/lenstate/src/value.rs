#![forbid(unsafe_code)]

//! Values and keys understood by the change tracer.
//!
//! The tracer and the lens adapters never look inside a value directly.
//! They go through the [`Traceable`] trait, which describes a value as either
//! an indivisible leaf or a keyed composite. Two implementations ship with
//! the crate:
//!
//! - [`Value`]: a dynamic value with copy-on-write composites. Cloning a
//!   composite is O(1) and two clones are recognised as identical without a
//!   deep comparison.
//! - `serde_json::Value` (feature `json`).
//!
//! # Key canonicalization
//!
//! Arrays are addressed by [`Key::Index`] and objects by [`Key::Field`]. A
//! field name that is a canonical decimal index (`"0"`, `"17"`) is always
//! stored as `Key::Index`, so the same property produces the same key no
//! matter how it was spelled at the call site.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use web_time::SystemTime;

/// Address of a child inside a composite value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Array position, or an object field whose name is a decimal index.
    Index(usize),
    /// Named object field.
    Field(String),
}

impl Key {
    /// Create a key from a field name, canonicalizing decimal indices.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        match parse_index(&name) {
            Some(index) => Self::Index(index),
            None => Self::Field(name),
        }
    }

    /// Create an index key.
    #[must_use]
    pub const fn index(index: usize) -> Self {
        Self::Index(index)
    }

    /// The key as an array position, if it denotes one.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Field(name) => parse_index(name),
        }
    }
}

fn parse_index(name: &str) -> Option<usize> {
    let canonical = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_digit())
        && (name.len() == 1 || !name.starts_with('0'));
    if canonical { name.parse().ok() } else { None }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Field(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::field(name)
    }
}

/// Shape contract between a value type and the change-propagation engine.
///
/// # Invariants
///
/// 1. `keys()` is empty for every value where `is_composite()` is false.
/// 2. `child(k)` is `Some` for every `k` in `keys()`.
/// 3. `identical(a, b)` implies `a == b`.
pub trait Traceable: Clone + PartialEq + fmt::Debug + 'static {
    /// Whether the tracer should descend into this value.
    fn is_composite(&self) -> bool;

    /// Own keys of a composite value.
    fn keys(&self) -> Vec<Key>;

    /// Read the child at `key`.
    ///
    /// Leaves may still expose children (a string exposes its characters)
    /// without being traced structurally.
    fn child(&self, key: &Key) -> Option<Cow<'_, Self>>;

    /// Overwrite (`Some`) or remove (`None`) the child at `key` in place.
    ///
    /// Writes that the value cannot hold are ignored.
    fn set_child(&mut self, key: &Key, value: Option<Self>);

    /// Cheap identity check used to skip deep comparisons.
    fn identical(&self, _other: &Self) -> bool {
        false
    }
}

/// Identity-then-equality comparison of two optional values.
pub(crate) fn same<T: Traceable>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.identical(b) || a == b,
        _ => false,
    }
}

/// Array write rule shared by every `Traceable` implementation.
///
/// In-range writes overwrite. Writes past the end pad with `hole()`.
/// Removing the last element truncates; removing any other element leaves a
/// hole behind so later indices keep their positions. A write whose padding
/// cannot be allocated is ignored.
pub(crate) fn write_index<T>(
    items: &mut Vec<T>,
    index: usize,
    value: Option<T>,
    hole: impl Fn() -> T,
) {
    match value {
        Some(value) if index < items.len() => items[index] = value,
        Some(value) => {
            if items.try_reserve((index - items.len()).saturating_add(1)).is_err() {
                trace!(message = "value.write_ignored", index, len = items.len());
                return;
            }
            items.resize_with(index, hole);
            items.push(value);
        }
        None if index.checked_add(1) == Some(items.len()) => {
            items.pop();
        }
        None if index < items.len() => items[index] = hole(),
        None => {}
    }
}

fn char_at<T>(text: &str, key: &Key, wrap: impl FnOnce(String) -> T) -> Option<T> {
    key.as_index()
        .and_then(|index| text.chars().nth(index))
        .map(|ch| wrap(ch.to_string()))
}

/// Dynamic value held by a state node.
///
/// Composites are reference counted and copied on write, so handing a value
/// to every subscriber of a broadcast costs one pointer bump each.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Date-like instant. Compared by the instant it denotes.
    Instant(SystemTime),
    Array(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
}

impl Value {
    /// Build an array value.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Array(Rc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build an object value.
    pub fn object<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(Rc::new(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_instant(&self) -> Option<SystemTime> {
        match self {
            Self::Instant(t) => Some(*t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }
}

impl Traceable for Value {
    fn is_composite(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    fn keys(&self) -> Vec<Key> {
        match self {
            Self::Array(items) => (0..items.len()).map(Key::Index).collect(),
            Self::Object(fields) => fields.keys().map(|k| Key::field(k.as_str())).collect(),
            _ => Vec::new(),
        }
    }

    fn child(&self, key: &Key) -> Option<Cow<'_, Self>> {
        match self {
            Self::Array(items) => key
                .as_index()
                .and_then(|index| items.get(index))
                .map(Cow::Borrowed),
            Self::Object(fields) => {
                let found = match key {
                    Key::Field(name) => fields.get(name.as_str()),
                    Key::Index(index) => fields.get(index.to_string().as_str()),
                };
                found.map(Cow::Borrowed)
            }
            Self::String(text) => char_at(text, key, |s| Cow::Owned(Self::String(s))),
            _ => None,
        }
    }

    fn set_child(&mut self, key: &Key, value: Option<Self>) {
        match self {
            Self::Object(fields) => {
                let fields = Rc::make_mut(fields);
                let name = key.to_string();
                match value {
                    Some(value) => {
                        fields.insert(name, value);
                    }
                    None => {
                        fields.remove(&name);
                    }
                }
            }
            Self::Array(items) => {
                if let Some(index) = key.as_index() {
                    write_index(Rc::make_mut(items), index, value, || Self::Null);
                }
            }
            _ => {}
        }
    }

    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SystemTime> for Value {
    fn from(t: SystemTime) -> Self {
        Self::Instant(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(items))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self::Object(Rc::new(fields))
    }
}

#[cfg(feature = "json")]
mod json {
    use std::borrow::Cow;
    use std::rc::Rc;

    use serde_json::Value as Json;

    use super::{Key, Traceable, Value, char_at, write_index};

    impl Traceable for Json {
        fn is_composite(&self) -> bool {
            matches!(self, Json::Array(_) | Json::Object(_))
        }

        fn keys(&self) -> Vec<Key> {
            match self {
                Json::Array(items) => (0..items.len()).map(Key::Index).collect(),
                Json::Object(fields) => fields.keys().map(|k| Key::field(k.as_str())).collect(),
                _ => Vec::new(),
            }
        }

        fn child(&self, key: &Key) -> Option<Cow<'_, Self>> {
            match self {
                Json::Array(items) => key
                    .as_index()
                    .and_then(|index| items.get(index))
                    .map(Cow::Borrowed),
                Json::Object(fields) => fields.get(key.to_string().as_str()).map(Cow::Borrowed),
                Json::String(text) => char_at(text, key, |s| Cow::Owned(Json::String(s))),
                _ => None,
            }
        }

        fn set_child(&mut self, key: &Key, value: Option<Self>) {
            match self {
                Json::Object(fields) => {
                    let name = key.to_string();
                    match value {
                        Some(value) => {
                            fields.insert(name, value);
                        }
                        None => {
                            fields.remove(&name);
                        }
                    }
                }
                Json::Array(items) => {
                    if let Some(index) = key.as_index() {
                        write_index(items, index, value, || Json::Null);
                    }
                }
                _ => {}
            }
        }
    }

    impl From<Json> for Value {
        fn from(json: Json) -> Self {
            match json {
                Json::Null => Value::Null,
                Json::Bool(b) => Value::Bool(b),
                Json::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
                Json::String(s) => Value::String(s),
                Json::Array(items) => {
                    Value::Array(Rc::new(items.into_iter().map(Value::from).collect()))
                }
                Json::Object(fields) => Value::Object(Rc::new(
                    fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_field_names_become_indices() {
        assert_eq!(Key::from("3"), Key::Index(3));
        assert_eq!(Key::from("0"), Key::Index(0));
        assert_eq!(Key::from("03"), Key::Field("03".into()));
        assert_eq!(Key::from("-1"), Key::Field("-1".into()));
        assert_eq!(Key::from(""), Key::Field(String::new()));
        assert_eq!(Key::from("num"), Key::Field("num".into()));
    }

    #[test]
    fn key_display_matches_property_name() {
        assert_eq!(Key::Index(12).to_string(), "12");
        assert_eq!(Key::field("x").to_string(), "x");
    }

    #[test]
    fn object_children_by_index_key() {
        let v = Value::object([("1", 10), ("x", 20)]);
        assert_eq!(v.child(&Key::Index(1)).as_deref(), Some(&Value::from(10)));
        assert_eq!(v.child(&Key::field("x")).as_deref(), Some(&Value::from(20)));
        assert!(v.child(&Key::field("y")).is_none());
    }

    #[test]
    fn strings_expose_characters_but_stay_leaves() {
        let v = Value::from("hellow");
        assert!(!v.is_composite());
        assert!(v.keys().is_empty());
        assert_eq!(v.child(&Key::Index(1)).as_deref(), Some(&Value::from("e")));
        assert!(v.child(&Key::Index(40)).is_none());
    }

    #[test]
    fn leaves_have_no_children() {
        assert!(Value::from(3).child(&Key::Index(0)).is_none());
        assert!(Value::Null.child(&Key::field("x")).is_none());
    }

    #[test]
    fn array_writes_pad_and_truncate() {
        let mut v = Value::array([1, 2]);
        v.set_child(&Key::Index(3), Some(Value::from(4)));
        assert_eq!(
            v,
            Value::array([Value::from(1), Value::from(2), Value::Null, Value::from(4)])
        );

        v.set_child(&Key::Index(3), None);
        assert_eq!(v, Value::array([Value::from(1), Value::from(2), Value::Null]));

        v.set_child(&Key::Index(0), None);
        assert_eq!(v, Value::array([Value::Null, Value::from(2), Value::Null]));

        v.set_child(&Key::Index(9), None);
        assert_eq!(v.as_array().map(<[Value]>::len), Some(3));
    }

    #[test]
    fn unreachable_indices_leave_arrays_unchanged() {
        let mut v = Value::array([1, 2, 3]);
        v.set_child(&Key::Index(usize::MAX), None);
        v.set_child(&Key::Index(usize::MAX), Some(Value::from(9)));
        v.set_child(&Key::Index(usize::MAX / 2), Some(Value::from(9)));
        assert_eq!(v, Value::array([1, 2, 3]));

        let mut empty = Value::array(Vec::<Value>::new());
        empty.set_child(&Key::Index(usize::MAX), Some(Value::from(9)));
        assert_eq!(empty, Value::array(Vec::<Value>::new()));

        let mut doc = json!([1, 2, 3]);
        doc.set_child(&Key::Index(usize::MAX), None);
        doc.set_child(&Key::Index(usize::MAX), Some(json!(9)));
        assert_eq!(doc, json!([1, 2, 3]));
    }

    #[test]
    fn object_writes_insert_and_remove() {
        let mut v = Value::object([("x", 1)]);
        v.set_child(&Key::field("y"), Some(Value::from(2)));
        v.set_child(&Key::field("x"), None);
        assert_eq!(v, Value::object([("y", 2)]));
    }

    #[test]
    fn writes_into_leaves_are_ignored() {
        let mut v = Value::from("abc");
        v.set_child(&Key::Index(0), Some(Value::from("z")));
        assert_eq!(v, Value::from("abc"));
    }

    #[test]
    fn copy_on_write_keeps_clones_apart() {
        let original = Value::array([1, 2, 3]);
        let mut edited = original.clone();
        assert!(original.identical(&edited));

        edited.set_child(&Key::Index(1), Some(Value::from(20)));
        assert!(!original.identical(&edited));
        assert_eq!(original, Value::array([1, 2, 3]));
        assert_eq!(edited, Value::array([1, 20, 3]));
    }

    #[test]
    fn json_documents_convert() {
        let v = Value::from(json!({"x": [1, true, null], "y": "s"}));
        assert_eq!(
            v,
            Value::object([
                (
                    "x",
                    Value::array([Value::from(1), Value::Bool(true), Value::Null])
                ),
                ("y", Value::from("s")),
            ])
        );
    }

    #[test]
    fn json_traceable_matches_value_semantics() {
        let mut doc = json!({"list": [1, 2]});
        let list = doc.child(&Key::field("list")).map(Cow::into_owned);
        assert_eq!(list, Some(json!([1, 2])));

        doc.set_child(&Key::field("list"), Some(json!([1, 2, 3])));
        doc.set_child(&Key::Index(0), Some(json!("zero")));
        assert_eq!(doc, json!({"0": "zero", "list": [1, 2, 3]}));
        assert_eq!(doc.keys(), vec![Key::Index(0), Key::field("list")]);
    }
}
