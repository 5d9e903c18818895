//! The configuration tree: [`Node`], [`Value`] and [`Container`].
//!
//! A tree is built from a [`Native`] document with [`Node::from_native`].
//! Mappings and sequences become [`Container`]s, everything else becomes a
//! [`Value`] leaf. Each child has exactly one owner, so the tree can never
//! contain a cycle and [`Clone`] is always a full structural copy.
//!
//! Lookups never fail: a missing path yields [`Node::Absent`], the sentinel.
//! The sentinel is falsy, equals only itself, and looking anything up on it
//! yields the sentinel again, so chained access on missing data is safe:
//!
//! ```
//! use sectfig::Node;
//! use serde_json::json;
//!
//! let tree = Node::from_native(json!({"model": {"name": "RF"}}));
//! assert!(tree.get("model.name").is_value());
//! assert!(tree["missing"]["deeper"]["path"].is_absent());
//! assert!(!tree.get("missing.deeper").is_truthy());
//! ```

use std::fmt;
use std::ops::Index;

use parking_lot::Mutex;

use crate::dtype::Dtype;
use crate::error::{Result, SectfigError};
use crate::types::{AsPath, Key, Native, NativeMap, join_path};

static ABSENT: Node = Node::Absent;

/// One element of the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    Value(Value),
    Container(Container),
    /// The sentinel returned for any missing lookup.
    #[default]
    Absent,
}

impl Node {
    /// Shared reference to the sentinel.
    pub fn absent() -> &'static Node {
        &ABSENT
    }

    /// Recursively convert a plain document into a tree.
    pub fn from_native(native: Native) -> Node {
        match native {
            Native::Object(map) => Node::Container(Container::from_map(map)),
            Native::Array(items) => Node::Container(Container::from_items(items)),
            scalar => Node::Value(Value::new(scalar)),
        }
    }

    /// Look up a descendant. Returns the sentinel when any segment is missing.
    /// An empty path names this node itself.
    pub fn get(&self, path: impl AsPath) -> &Node {
        self.get_segments(&path.to_segments())
    }

    /// Like [`Node::get`], but returns `default` instead of the sentinel.
    pub fn get_or<'a>(&'a self, path: impl AsPath, default: &'a Node) -> &'a Node {
        match self.get(path) {
            Node::Absent => default,
            found => found,
        }
    }

    pub(crate) fn get_segments(&self, segments: &[String]) -> &Node {
        let mut current = self;
        for segment in segments {
            current = match current {
                Node::Container(container) => container.child(segment).unwrap_or(&ABSENT),
                _ => return &ABSENT,
            };
        }
        current
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Absent)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Node::Value(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Container(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Node::Container(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Node::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Truthiness of the raw tree: a container is truthy when it has children,
    /// a value follows [`native_truthy`] on its raw form, the sentinel never is.
    ///
    /// Use [`Config::is_truthy`](crate::Config::is_truthy) for the resolved form.
    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Value(value) => native_truthy(value.raw()),
            Node::Container(container) => !container.is_empty(),
            Node::Absent => false,
        }
    }

    /// Convert back to a plain document without substitution.
    ///
    /// Absent children are omitted from mappings and become `null` in sequences.
    pub fn to_raw_native(&self) -> Native {
        match self {
            Node::Value(value) => value.raw().clone(),
            Node::Container(container) => container.to_raw_native(),
            Node::Absent => Native::Null,
        }
    }
}

impl From<Native> for Node {
    fn from(native: Native) -> Self {
        Node::from_native(native)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

impl From<Container> for Node {
    fn from(container: Container) -> Self {
        Node::Container(container)
    }
}

impl Index<&str> for Node {
    type Output = Node;

    fn index(&self, key: &str) -> &Node {
        self.get(key)
    }
}

impl Index<usize> for Node {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        match self {
            Node::Container(container) => container.child(&index.to_string()).unwrap_or(&ABSENT),
            _ => &ABSENT,
        }
    }
}

/// Python-like truthiness for native values.
pub fn native_truthy(native: &Native) -> bool {
    match native {
        Native::Null => false,
        Native::Bool(b) => *b,
        Native::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Native::String(s) => !s.is_empty(),
        Native::Array(items) => !items.is_empty(),
        Native::Object(map) => !map.is_empty(),
    }
}

#[derive(Debug, Clone)]
struct Cached {
    generation: u64,
    value: Native,
}

/// A leaf holding one raw value plus its most recently resolved form.
///
/// The cache is tagged with the generation of the owning tree; any mutation
/// through [`Config`](crate::Config) bumps the generation, which invalidates
/// every cached resolution at once.
pub struct Value {
    raw: Native,
    coerce: Option<Dtype>,
    cache: Mutex<Option<Cached>>,
}

impl Value {
    pub fn new(raw: impl Into<Native>) -> Self {
        Self {
            raw: raw.into(),
            coerce: None,
            cache: Mutex::new(None),
        }
    }

    /// The original, pre-substitution form.
    pub fn raw(&self) -> &Native {
        &self.raw
    }

    /// Replace the raw form. Drops the cache and any coercion target.
    pub fn set_raw(&mut self, raw: impl Into<Native>) {
        self.raw = raw.into();
        self.coerce = None;
        *self.cache.get_mut() = None;
    }

    /// Whether the raw form is a string containing at least one marker.
    pub fn has_markers(&self) -> bool {
        self.raw.as_str().is_some_and(|s| s.contains("${"))
    }

    /// The dtype this value is coerced to after substitution, if any.
    pub fn coerce_to(&self) -> Option<Dtype> {
        self.coerce
    }

    pub(crate) fn set_coerce(&mut self, dtype: Option<Dtype>) {
        if self.coerce != dtype {
            self.coerce = dtype;
            *self.cache.get_mut() = None;
        }
    }

    pub(crate) fn cached(&self, generation: u64) -> Option<Native> {
        self.cache
            .lock()
            .as_ref()
            .filter(|c| c.generation == generation)
            .map(|c| c.value.clone())
    }

    pub(crate) fn store(&self, generation: u64, value: Native) {
        *self.cache.lock() = Some(Cached { generation, value });
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            coerce: self.coerce,
            cache: Mutex::new(None),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Children {
    Mapping(Vec<(String, Node)>),
    Sequence(Vec<Node>),
}

/// An ordered mapping or a sequence of child nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    children: Children,
}

impl Default for Container {
    fn default() -> Self {
        Self::mapping()
    }
}

impl Container {
    /// An empty mapping-mode container.
    pub fn mapping() -> Self {
        Self {
            children: Children::Mapping(Vec::new()),
        }
    }

    /// An empty sequence-mode container.
    pub fn sequence() -> Self {
        Self {
            children: Children::Sequence(Vec::new()),
        }
    }

    pub fn from_map(map: NativeMap) -> Self {
        let entries = map
            .into_iter()
            .map(|(key, value)| (key, Node::from_native(value)))
            .collect();
        Self {
            children: Children::Mapping(entries),
        }
    }

    pub fn from_items(items: Vec<Native>) -> Self {
        Self {
            children: Children::Sequence(items.into_iter().map(Node::from_native).collect()),
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.children, Children::Sequence(_))
    }

    pub fn len(&self) -> usize {
        match &self.children {
            Children::Mapping(entries) => entries.len(),
            Children::Sequence(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct child by a single path segment.
    pub fn child(&self, segment: &str) -> Option<&Node> {
        match &self.children {
            Children::Mapping(entries) => entries.iter().find(|(k, _)| k == segment).map(|(_, n)| n),
            Children::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }

    pub fn child_mut(&mut self, segment: &str) -> Option<&mut Node> {
        match &mut self.children {
            Children::Mapping(entries) => entries
                .iter_mut()
                .find(|(k, _)| k == segment)
                .map(|(_, n)| n),
            Children::Sequence(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(move |i| items.get_mut(i)),
        }
    }

    /// Look up a descendant. Returns the sentinel when any segment is missing.
    ///
    /// An empty path also yields the sentinel: a bare container is not a
    /// [`Node`], so it has no node to hand back for itself. Wrap it in
    /// [`Node::Container`] and call [`Node::get`] when `""` should mean the
    /// whole tree.
    pub fn get(&self, path: impl AsPath) -> &Node {
        let segments = path.to_segments();
        let Some((first, rest)) = segments.split_first() else {
            return &ABSENT;
        };
        self.child(first)
            .map(|node| node.get_segments(rest))
            .unwrap_or(&ABSENT)
    }

    pub fn get_mut(&mut self, path: impl AsPath) -> Option<&mut Node> {
        let segments = path.to_segments();
        let (first, rest) = segments.split_first()?;
        let mut current = self.child_mut(first)?;
        for segment in rest {
            current = current.as_container_mut()?.child_mut(segment)?;
        }
        Some(current)
    }

    /// Whether a non-sentinel node exists at `path`.
    pub fn contains(&self, path: impl AsPath) -> bool {
        !self.get(path).is_absent()
    }

    /// Insert or replace the node at `path`, creating intermediate mapping
    /// containers as needed. A scalar in the way of a deeper path is replaced
    /// by a container.
    pub fn set(&mut self, path: impl AsPath, node: impl Into<Node>) -> Result<()> {
        let segments = path.to_segments();
        let Some((last, parents)) = segments.split_last() else {
            return Err(SectfigError::structure("", "cannot replace the root container"));
        };
        let mut current = self;
        for depth in 0..parents.len() {
            current = current.child_container_mut(&segments[..=depth])?;
        }
        current.put(last, node.into(), &segments)
    }

    /// Detach and return the node at `path`.
    pub fn remove(&mut self, path: impl AsPath) -> Option<Node> {
        let segments = path.to_segments();
        let (last, parents) = segments.split_last()?;
        let parent = if parents.is_empty() {
            self
        } else {
            self.get_mut(parents)?.as_container_mut()?
        };
        match &mut parent.children {
            Children::Mapping(entries) => {
                let position = entries.iter().position(|(k, _)| k == last)?;
                Some(entries.remove(position).1)
            }
            Children::Sequence(items) => {
                let index = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
                Some(items.remove(index))
            }
        }
    }

    /// Append to a sequence, or insert under the next free numeric key of a mapping.
    pub fn push(&mut self, node: impl Into<Node>) {
        match &mut self.children {
            Children::Sequence(items) => items.push(node.into()),
            Children::Mapping(entries) => {
                let key = entries.len().to_string();
                entries.push((key, node.into()));
            }
        }
    }

    /// Iterate `(key, node)` pairs in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        match &self.children {
            Children::Mapping(entries) => Iter::Mapping(entries.iter()),
            Children::Sequence(items) => Iter::Sequence(items.iter().enumerate()),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Identical to [`Clone::clone`]: children are exclusively owned, so a
    /// copy can never share them with its source.
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    pub fn to_raw_native(&self) -> Native {
        match &self.children {
            Children::Mapping(entries) => Native::Object(
                entries
                    .iter()
                    .filter(|(_, node)| !node.is_absent())
                    .map(|(key, node)| (key.clone(), node.to_raw_native()))
                    .collect(),
            ),
            Children::Sequence(items) => {
                Native::Array(items.iter().map(Node::to_raw_native).collect())
            }
        }
    }

    fn child_container_mut(&mut self, at: &[String]) -> Result<&mut Container> {
        let segment = &at[at.len() - 1];
        if !matches!(self.child(segment), Some(Node::Container(_))) {
            self.put(segment, Node::Container(Container::mapping()), at)?;
        }
        match self.child_mut(segment) {
            Some(Node::Container(container)) => Ok(container),
            _ => Err(SectfigError::structure(
                join_path(at),
                "could not create an intermediate container",
            )),
        }
    }

    fn put(&mut self, segment: &str, node: Node, at: &[String]) -> Result<()> {
        match &mut self.children {
            Children::Mapping(entries) => {
                match entries.iter_mut().find(|(k, _)| k == segment) {
                    Some((_, slot)) => *slot = node,
                    None => entries.push((segment.to_string(), node)),
                }
                Ok(())
            }
            Children::Sequence(items) => {
                let index = segment.parse::<usize>().map_err(|_| {
                    SectfigError::structure(join_path(at), "sequence keys must be integers")
                })?;
                match index.cmp(&items.len()) {
                    std::cmp::Ordering::Less => items[index] = node,
                    std::cmp::Ordering::Equal => items.push(node),
                    std::cmp::Ordering::Greater => {
                        return Err(SectfigError::structure(
                            join_path(at),
                            format!("index {index} is past the end (length {})", items.len()),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

impl Index<&str> for Container {
    type Output = Node;

    fn index(&self, key: &str) -> &Node {
        self.get(key)
    }
}

impl Index<usize> for Container {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        self.child(&index.to_string()).unwrap_or(&ABSENT)
    }
}

impl<'a> IntoIterator for &'a Container {
    type Item = (Key, &'a Node);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a container's children.
pub enum Iter<'a> {
    Mapping(std::slice::Iter<'a, (String, Node)>),
    Sequence(std::iter::Enumerate<std::slice::Iter<'a, Node>>),
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Key, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Iter::Mapping(inner) => inner.next().map(|(k, n)| (Key::Name(k.clone()), n)),
            Iter::Sequence(inner) => inner.next().map(|(i, n)| (Key::Index(i), n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(native: Native) -> Container {
        match Node::from_native(native) {
            Node::Container(c) => c,
            other => panic!("expected a container, got {other:?}"),
        }
    }

    #[test]
    fn build_then_native_is_identity() {
        let doc = json!({
            "name": "run",
            "epochs": 10,
            "rate": 0.5,
            "flags": [true, false, null],
            "model": {"kind": "RF", "params": {"depth": 3}},
            "quoted": "5"
        });
        assert_eq!(tree(doc.clone()).to_raw_native(), doc);
    }

    #[test]
    fn insertion_order_preserved() {
        let c = tree(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<String> = c.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn missing_paths_yield_sentinel_at_any_depth() {
        let c = tree(json!({"a": {"b": 1}}));
        assert!(c.get("missing").is_absent());
        assert!(c.get("missing.deeper.path").is_absent());
        assert!(c.get("a.b.c").is_absent());
        assert!(!c.get("missing.deeper.path").is_truthy());
        assert!(c["a"]["nope"]["still"].is_absent());
    }

    #[test]
    fn explicit_default_replaces_sentinel() {
        let root = Node::from_native(json!({"a": {"b": 1}}));
        let fallback = Node::Value(Value::new(json!("fallback")));
        assert_eq!(root.get_or("a.b", &fallback).to_raw_native(), json!(1));
        assert_eq!(root.get_or("a.x", &fallback).to_raw_native(), json!("fallback"));
    }

    #[test]
    fn sentinel_equals_only_itself() {
        assert_eq!(Node::Absent, *Node::absent());
        assert_ne!(Node::Absent, Node::Value(Value::new(Native::Null)));
        assert_ne!(Node::Absent, Node::Container(Container::mapping()));
    }

    #[test]
    fn sequence_indexing() {
        let c = tree(json!({"sects": [{"name": "x"}, {"name": "y"}]}));
        assert_eq!(c.get("sects.1.name").to_raw_native(), json!("y"));
        assert_eq!(c.get("sects[0].name").to_raw_native(), json!("x"));
        assert_eq!(c["sects"][1]["name"].to_raw_native(), json!("y"));
        assert!(c.get("sects.5").is_absent());
        assert!(c.get("sects.name").is_absent());
    }

    #[test]
    fn set_creates_intermediates() {
        let mut c = Container::mapping();
        c.set("a.b.c", Value::new(1)).unwrap();
        assert_eq!(c.to_raw_native(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_replaces_scalar_with_container_and_back() {
        let mut c = tree(json!({"a": 1}));
        c.set("a.b", Value::new(2)).unwrap();
        assert_eq!(c.to_raw_native(), json!({"a": {"b": 2}}));
        c.set("a", Value::new("flat")).unwrap();
        assert_eq!(c.to_raw_native(), json!({"a": "flat"}));
    }

    #[test]
    fn set_on_sequence_appends_at_len_and_rejects_gaps() {
        let mut c = tree(json!({"xs": [1, 2]}));
        c.set("xs.2", Value::new(3)).unwrap();
        c.set("xs.0", Value::new(0)).unwrap();
        assert_eq!(c.get("xs").to_raw_native(), json!([0, 2, 3]));

        let err = c.set("xs.9", Value::new(9)).unwrap_err();
        assert!(err.to_string().contains("xs.9"));
        assert!(c.set("xs.name", Value::new(1)).is_err());
    }

    #[test]
    fn root_cannot_be_replaced() {
        let mut c = Container::mapping();
        assert!(c.set("", Value::new(1)).is_err());
    }

    #[test]
    fn remove_detaches_node() {
        let mut c = tree(json!({"a": {"b": 1, "c": 2}, "xs": [1, 2, 3]}));
        let removed = c.remove("a.b").unwrap();
        assert_eq!(removed.to_raw_native(), json!(1));
        assert!(!c.contains("a.b"));
        assert_eq!(c.remove("xs.0").unwrap().to_raw_native(), json!(1));
        assert_eq!(c.get("xs").to_raw_native(), json!([2, 3]));
        assert!(c.remove("nope.nothing").is_none());
    }

    #[test]
    fn reparenting_moves_ownership() {
        let mut c = tree(json!({"src": {"inner": {"k": 1}}, "dst": {}}));
        let moved = c.remove("src.inner").unwrap();
        c.set("dst.inner", moved).unwrap();
        assert!(c.get("src.inner").is_absent());
        assert_eq!(c.get("dst.inner.k").to_raw_native(), json!(1));
    }

    #[test]
    fn deep_copy_is_independent() {
        let original = tree(json!({"a": {"b": {"c": 1}}}));
        let mut copy = original.clone();
        copy.set("a.b.c", Value::new(99)).unwrap();
        assert_eq!(original.get("a.b.c").to_raw_native(), json!(1));
        assert_eq!(copy.get("a.b.c").to_raw_native(), json!(99));
    }

    #[test]
    fn iteration_yields_keys_and_indices() {
        let c = tree(json!({"m": {"x": 1}, "s": ["a", "b"]}));
        let m: Vec<Key> = c.get("m").as_container().unwrap().keys().collect();
        assert_eq!(m, [Key::Name("x".into())]);
        let s: Vec<Key> = c.get("s").as_container().unwrap().keys().collect();
        assert_eq!(s, [Key::Index(0), Key::Index(1)]);
    }

    #[test]
    fn truthiness() {
        assert!(!Node::Container(Container::mapping()).is_truthy());
        assert!(Node::from_native(json!({"a": 1})).is_truthy());
        assert!(!Node::from_native(json!(0)).is_truthy());
        assert!(!Node::from_native(json!("")).is_truthy());
        assert!(Node::from_native(json!("x")).is_truthy());
        assert!(!Node::from_native(json!(null)).is_truthy());
        assert!(!Node::Absent.is_truthy());
    }

    #[test]
    fn value_cache_respects_generation() {
        let value = Value::new("${.a}");
        assert!(value.has_markers());
        value.store(1, json!("x"));
        assert_eq!(value.cached(1), Some(json!("x")));
        assert_eq!(value.cached(2), None);
        assert_eq!(value.clone().cached(1), None);
    }

    #[test]
    fn absent_children_are_omitted_from_native() {
        let mut c = Container::mapping();
        c.set("present", Value::new(1)).unwrap();
        c.set("missing", Node::Absent).unwrap();
        assert!(c.get("missing").is_absent());
        assert_eq!(c.to_raw_native(), json!({"present": 1}));
    }

    #[test]
    fn empty_path_on_node_and_container() {
        let node = Node::from_native(json!({"a": 1}));
        assert!(std::ptr::eq(node.get(""), &node));
        let container = node.as_container().unwrap();
        assert!(container.get("").is_absent());
        assert!(!container.contains(""));
    }
}
