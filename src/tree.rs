//! The document tree: a recursive value plus dotted-path cursors into it.
//!
//! This is the data model opcalls read from and write to. It intentionally
//! knows nothing about YAML bytes — reading/writing the document to a byte
//! stream is a different crate's concern.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A recursive document value.
///
/// Maps preserve insertion order (a `Vec<(String, Value)>` rather than a
/// hash map) so that re-serializing the tree produces stable output; keys
/// are still required to be unique within one map, enforced by the
/// `insert`/`from_pairs` constructors rather than by the type itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Map),
}

/// An insertion-ordered string-keyed map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Map { entries: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Inserts or overwrites `key`. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted (lexicographic) keys, used by the `keys` operator.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys
    }

    /// Recursive deep-merge: `other` wins on scalar/type conflicts; maps
    /// merge key-by-key; anything else is overwritten wholesale. Used by
    /// the `inject` operator.
    pub fn merge_from(&mut self, other: &Map) {
        for (key, value) in other.iter() {
            match (self.get_mut(key), value) {
                (Some(Value::Map(existing)), Value::Map(incoming)) => {
                    existing.merge_from(incoming);
                }
                _ => {
                    self.insert(key.to_string(), value.clone());
                }
            }
        }
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Value {
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Falsy values are `false`, `null`, numeric zero of any kind, empty
    /// string, empty list, empty map. Everything else — notably the
    /// strings `"0"` and `"false"` — is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Canonical-decimal stringification used by `concat`/string `Add`:
    /// integers print without a decimal point, floats print with a
    /// fixed-point representation.
    pub fn stringify_scalar(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format!("{}", DecimalFloat(*f))),
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Wraps an `f64` so it formats the way the numeric handler's canonical
/// decimal form requires (`%f`-style, not Rust's default shortest-repr).
struct DecimalFloat(f64);

impl fmt::Display for DecimalFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// One segment of a `Cursor`: a map key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A dotted path into the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Cursor {
    segments: Vec<Segment>,
}

impl Cursor {
    pub fn root() -> Self {
        Cursor { segments: Vec::new() }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Cursor { segments }
    }

    /// Parses a dotted path such as `meta.base` or `list.0.name`. Numeric
    /// segments are treated as list indices.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(n) => Segment::Index(n),
                Err(_) => Segment::Key(s.to_string()),
            })
            .collect();
        Cursor { segments }
    }

    pub fn push_key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Cursor { segments }
    }

    pub fn push_index(&self, idx: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(idx));
        Cursor { segments }
    }

    pub fn parent(&self) -> Option<Cursor> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Cursor {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True iff `other` is a (non-strict) prefix of this cursor, i.e. this
    /// cursor is at or under `other` in the tree.
    pub fn under(&self, other: &Cursor) -> bool {
        if other.segments.len() > self.segments.len() {
            return false;
        }
        self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Resolves this cursor against `tree`, returning `None` if any segment
    /// is missing or type-incompatible.
    pub fn resolve<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        let mut current = tree;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(k), Value::Map(m)) => m.get(k)?,
                (Segment::Index(i), Value::List(l)) => l.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn resolve_mut<'a>(&self, tree: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = tree;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(k), Value::Map(m)) => m.get_mut(k)?,
                (Segment::Index(i), Value::List(l)) => l.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Writes `value` at this cursor, creating intermediate maps as needed.
    /// List segments must already exist (lists are never auto-grown, since
    /// the evaluator only ever replaces opcall scalars already present in
    /// the tree).
    pub fn write(&self, tree: &mut Value, value: Value) -> Option<()> {
        if self.segments.is_empty() {
            *tree = value;
            return Some(());
        }
        let (last, init) = self.segments.split_last().unwrap();
        let mut current = tree;
        for segment in init {
            current = match (segment, current) {
                (Segment::Key(k), Value::Map(m)) => {
                    if m.get(k).is_none() {
                        m.insert(k.clone(), Value::Map(Map::new()));
                    }
                    m.get_mut(k).unwrap()
                }
                (Segment::Index(i), Value::List(l)) => l.get_mut(*i)?,
                _ => return None,
            };
        }
        match (last, current) {
            (Segment::Key(k), Value::Map(m)) => {
                m.insert(k.clone(), value);
            }
            (Segment::Index(i), Value::List(l)) => {
                if *i >= l.len() {
                    return None;
                }
                l[*i] = value;
            }
            _ => return None,
        }
        Some(())
    }

    /// Walks list-by-name references and merge-key heuristics to a stable
    /// form. The merge primitive that actually performs named-list merges
    /// lives elsewhere; here canonicalization is a no-op beyond
    /// normalizing segment order, since this crate receives
    /// an already-merged (or currently-merging) tree and only needs a
    /// stable identity for dependency-graph purposes.
    pub fn canonical(&self, _tree: &Value) -> Cursor {
        self.clone()
    }

    pub fn render(&self) -> String {
        if self.segments.is_empty() {
            return ".".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_nested_path() {
        let mut root = Map::new();
        let mut meta = Map::new();
        meta.insert("base", Value::Int(100));
        root.insert("meta", Value::Map(meta));
        let tree = Value::Map(root);

        let cursor = Cursor::parse("meta.base");
        assert_eq!(cursor.resolve(&tree), Some(&Value::Int(100)));
    }

    #[test]
    fn write_creates_intermediate_maps() {
        let mut tree = Value::Map(Map::new());
        let cursor = Cursor::parse("a.b");
        cursor.write(&mut tree, Value::Int(5)).unwrap();
        assert_eq!(Cursor::parse("a.b").resolve(&tree), Some(&Value::Int(5)));
    }

    #[test]
    fn under_is_prefix_containment() {
        let parent = Cursor::parse("meta");
        let child = Cursor::parse("meta.base");
        assert!(child.under(&parent));
        assert!(!parent.under(&child));
        assert!(parent.under(&parent));
    }

    #[test]
    fn truthiness_table() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Map(Map::new()).is_truthy());
        // notably truthy:
        assert!(Value::Str("0".to_string()).is_truthy());
        assert!(Value::Str("false".to_string()).is_truthy());
    }

    #[test]
    fn deep_merge_overwrites_scalars_and_merges_maps() {
        let mut base = Map::new();
        base.insert("a", Value::Int(1));
        let mut base_nested = Map::new();
        base_nested.insert("x", Value::Int(1));
        base.insert("nested", Value::Map(base_nested));

        let mut incoming = Map::new();
        incoming.insert("a", Value::Int(2));
        let mut incoming_nested = Map::new();
        incoming_nested.insert("y", Value::Int(2));
        incoming.insert("nested", Value::Map(incoming_nested));

        base.merge_from(&incoming);
        assert_eq!(base.get("a"), Some(&Value::Int(2)));
        let nested = base.get("nested").unwrap().as_map().unwrap();
        assert_eq!(nested.get("x"), Some(&Value::Int(1)));
        assert_eq!(nested.get("y"), Some(&Value::Int(2)));
    }
}
