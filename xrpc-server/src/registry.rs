//! Method registry for XML-RPC path resolution
//!
//! Handlers live in a tree: leaves are handlers, branches are namespaces.
//! A method path such as `blogger.getUsersBlogs` or `users[admin].get`
//! names a route from the root to a leaf.
//!
//! # Path Syntax
//!
//! Before resolution a path is normalized:
//!
//! - every `[word]` becomes `.word` (word characters are ASCII
//!   alphanumerics and `_`)
//! - one leading `.` is dropped
//!
//! The result is split on `.`. Resolution walks the segments from the root
//! and succeeds only if the last segment lands on a leaf. A path that ends
//! on a branch, passes through a leaf, or names a missing segment does not
//! resolve.
//!
//! # Thread Safety
//!
//! A built [`Registry`] is immutable and cheaply cloneable (`Arc` inside),
//! so every in-flight request can resolve against it without locking.
//!
//! # Examples
//!
//! ```rust
//! use xrpc_server::{from_fn, Registry, RegistryBuilder};
//!
//! let registry = Registry::builder()
//!     .handler("ping", from_fn(|_, reply| { reply.ok("pong"); Ok(()) }))
//!     .namespace(
//!         "blogger",
//!         RegistryBuilder::new()
//!             .handler("getUsersBlogs", from_fn(|_, reply| { reply.ok(true); Ok(()) })),
//!     )
//!     .build();
//!
//! assert!(registry.resolve("blogger.getUsersBlogs").is_some());
//! assert!(registry.resolve("blogger[getUsersBlogs]").is_some());
//! assert!(registry.resolve("blogger").is_none());
//! assert_eq!(registry.methods(), vec!["blogger.getUsersBlogs", "ping"]);
//! ```

use crate::handler::Handler;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node of the method tree
#[derive(Clone)]
pub enum RegistryNode {
    /// A callable method
    Leaf(Arc<dyn Handler>),
    /// A namespace of named children
    Branch(BTreeMap<String, RegistryNode>),
}

impl std::fmt::Debug for RegistryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryNode::Leaf(_) => f.write_str("Leaf"),
            RegistryNode::Branch(children) => f.debug_map().entries(children.iter()).finish(),
        }
    }
}

/// Objects that expose their methods under one conventional hook
///
/// Registering such an object with [`RegistryBuilder::service`] merges the
/// returned tree into the registry root.
///
/// ```rust
/// use xrpc_server::{from_fn, MethodProvider, RegistryBuilder};
///
/// struct Counter { start: i32 }
///
/// impl MethodProvider for Counter {
///     fn xml_rpc_methods(&self) -> RegistryBuilder {
///         let start = self.start;
///         RegistryBuilder::new().handler(
///             "counter.start",
///             from_fn(move |_, reply| { reply.ok(start); Ok(()) }),
///         )
///     }
/// }
/// ```
pub trait MethodProvider {
    /// The methods this object serves
    fn xml_rpc_methods(&self) -> RegistryBuilder;
}

/// Normalize a method path to its dotted form
///
/// ```rust
/// use xrpc_server::normalize_path;
///
/// assert_eq!(normalize_path("a[b]"), "a.b");
/// assert_eq!(normalize_path("[a].b"), "a.b");
/// assert_eq!(normalize_path("a[b-c]"), "a[b-c]");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if close > 0 && after[..close].chars().all(is_word_char) => {
                out.push('.');
                out.push_str(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    match out.strip_prefix('.') {
        Some(stripped) => stripped.to_string(),
        None => out,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Immutable method tree shared by every request
#[derive(Clone, Default)]
pub struct Registry {
    root: Arc<BTreeMap<String, RegistryNode>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Find the handler a method path names
    pub fn resolve(&self, path: &str) -> Option<Arc<dyn Handler>> {
        let normalized = normalize_path(path);
        let mut segments = normalized.split('.');
        let mut node = self.root.get(segments.next()?)?;

        for segment in segments {
            node = match node {
                RegistryNode::Branch(children) => children.get(segment)?,
                RegistryNode::Leaf(_) => return None,
            };
        }

        match node {
            RegistryNode::Leaf(handler) => Some(Arc::clone(handler)),
            RegistryNode::Branch(_) => None,
        }
    }

    /// Whether a method path resolves
    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Every callable path in dotted form, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods = Vec::new();
        let mut pending: Vec<(String, &BTreeMap<String, RegistryNode>)> =
            vec![(String::new(), self.root.as_ref())];

        while let Some((prefix, children)) = pending.pop() {
            for (name, node) in children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                match node {
                    RegistryNode::Leaf(_) => methods.push(path),
                    RegistryNode::Branch(grandchildren) => pending.push((path, grandchildren)),
                }
            }
        }

        methods.sort();
        methods
    }

    pub fn len(&self) -> usize {
        self.methods().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Builder for a [`Registry`]
///
/// Later registrations win: registering below an existing leaf turns it
/// into a branch, and registering a leaf over a branch replaces the whole
/// namespace. Both cases are logged.
#[derive(Default)]
pub struct RegistryBuilder {
    root: BTreeMap<String, RegistryNode>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at a method path
    ///
    /// Paths use the same syntax as requests (`a.b`, `a[b]`). Paths with an
    /// empty segment are ignored.
    pub fn handler(mut self, path: &str, handler: Box<dyn Handler>) -> Self {
        self.insert(path, RegistryNode::Leaf(Arc::from(handler)));
        self
    }

    /// Graft a sub-tree under a namespace path
    pub fn namespace(mut self, path: &str, methods: RegistryBuilder) -> Self {
        self.insert(path, RegistryNode::Branch(methods.root));
        self
    }

    /// Merge the methods an object exposes into the root
    pub fn service(mut self, provider: &impl MethodProvider) -> Self {
        merge(&mut self.root, provider.xml_rpc_methods().root);
        self
    }

    /// Merge another builder into this one
    pub fn merge(mut self, other: RegistryBuilder) -> Self {
        merge(&mut self.root, other.root);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            root: Arc::new(self.root),
        }
    }

    fn insert(&mut self, path: &str, node: RegistryNode) {
        let normalized = normalize_path(path);
        let segments: Vec<&str> = normalized.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            tracing::warn!(path = %path, "Ignoring method path with an empty segment");
            return;
        }
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut level = &mut self.root;
        for segment in parents {
            let entry = level
                .entry(segment.to_string())
                .or_insert_with(|| RegistryNode::Branch(BTreeMap::new()));
            if let RegistryNode::Leaf(_) = entry {
                tracing::warn!(path = %path, segment = %segment, "Replacing method with namespace");
                *entry = RegistryNode::Branch(BTreeMap::new());
            }
            level = match entry {
                RegistryNode::Branch(children) => children,
                RegistryNode::Leaf(_) => return,
            };
        }

        if level.insert(last.to_string(), node).is_some() {
            tracing::warn!(path = %path, "Replacing previously registered method");
        }
    }
}

fn merge(into: &mut BTreeMap<String, RegistryNode>, from: BTreeMap<String, RegistryNode>) {
    for (name, node) in from {
        match (into.get_mut(&name), node) {
            (Some(RegistryNode::Branch(existing)), RegistryNode::Branch(children)) => {
                merge(existing, children)
            }
            (_, node) => {
                into.insert(name, node);
            }
        }
    }
}
