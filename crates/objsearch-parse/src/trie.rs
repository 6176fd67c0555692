//! Path-matching tries.
//!
//! Nodes live in an arena and are addressed by [`NodeId`], which only a
//! trie hands out. Lookups with an id the trie does not hold find nothing.
//! Children keep insertion order. Two markings share the same shape:
//!
//! - [`ExtractionTrie`]: `need_all` (copy the whole subtree) and `skip_level`
//!   (selector level, located but not copied)
//! - [`ValueCollectingTrie`]: a list of caller rules per node

use objsearch_types::{ObjectJsonPath, ARRAY_WILDCARD, MAP_WILDCARD};

/// Opaque index of a node in a trie arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The root node of every trie.
pub const ROOT: NodeId = NodeId(0);

#[derive(Debug, Clone)]
struct Node<M> {
    children: Vec<(String, NodeId)>,
    mark: M,
}

/// Arena trie keyed by raw path segments.
#[derive(Debug, Clone)]
struct PathTrie<M> {
    nodes: Vec<Node<M>>,
}

impl<M: Default> PathTrie<M> {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                children: Vec::new(),
                mark: M::default(),
            }],
        }
    }

    /// Walk `path` from the root, creating missing nodes.
    fn ensure(&mut self, path: &ObjectJsonPath) -> NodeId {
        let mut current = ROOT.0;
        for segment in path.segments() {
            current = match self.child(NodeId(current), segment) {
                Some(existing) => existing.0,
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(Node {
                        children: Vec::new(),
                        mark: M::default(),
                    });
                    self.nodes[current].children.push((segment.clone(), NodeId(id)));
                    id
                }
            };
        }
        NodeId(current)
    }
}

impl<M> PathTrie<M> {
    fn node(&self, node: NodeId) -> Option<&Node<M>> {
        self.nodes.get(node.0)
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut Node<M>> {
        self.nodes.get_mut(node.0)
    }

    fn child(&self, node: NodeId, segment: &str) -> Option<NodeId> {
        self.node(node)?
            .children
            .iter()
            .find(|(s, _)| s == segment)
            .map(|(_, id)| *id)
    }

    fn children(&self, node: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.node(node)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .map(|(s, id)| (s.as_str(), *id))
    }

    fn has_children(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| !n.children.is_empty())
    }

    fn match_key(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.child(node, key)
            .or_else(|| self.child(node, MAP_WILDCARD))
    }

    fn match_index(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.child(node, &index.to_string())
            .or_else(|| self.child(node, ARRAY_WILDCARD))
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Flags carried by an extraction node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionMark {
    /// Copy the entire subtree below this node
    pub need_all: bool,
    /// Node lies on the selector path above the sub-object root
    pub skip_level: bool,
}

/// Trie marking which paths are sliced out as sub-documents.
#[derive(Debug, Clone)]
pub struct ExtractionTrie {
    inner: PathTrie<ExtractionMark>,
}

impl Default for ExtractionTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionTrie {
    pub fn new() -> Self {
        Self {
            inner: PathTrie::new(),
        }
    }

    /// Trie for one selector and the sub-paths retained below it.
    ///
    /// Both are normalized first. A retained path ending in a wildcard keeps
    /// everything beneath its preceding segment. No retained paths (or a
    /// retained root) keeps the whole sub-object.
    pub fn for_selector(selector: &ObjectJsonPath, retained: &[ObjectJsonPath]) -> Self {
        let mut trie = Self::new();
        let selector = selector.normalized();

        let segments = selector.segments();
        for depth in 0..segments.len() {
            let prefix = ObjectJsonPath::from_segments(segments[..depth].iter().cloned());
            trie.add_path(&prefix, false, true);
        }
        trie.add_path(&selector, retained.is_empty(), false);

        for path in retained {
            let path = path.normalized();
            let path = if path.ends_with_wildcard() {
                path.parent().unwrap_or_default()
            } else {
                path
            };
            trie.add_path(&selector.join(&path), true, false);
        }
        trie
    }

    /// Grow the trie so `path` resolves to a node carrying the flags.
    ///
    /// Flags are OR-merged with whatever earlier inserts set. The empty path
    /// marks the root itself.
    pub fn add_path(&mut self, path: &ObjectJsonPath, need_all: bool, skip_level: bool) -> NodeId {
        let id = self.inner.ensure(path);
        if let Some(node) = self.inner.node_mut(id) {
            node.mark.need_all |= need_all;
            node.mark.skip_level |= skip_level;
        }
        id
    }

    /// Flags of `node`; unset for an id this trie does not hold.
    pub fn mark(&self, node: NodeId) -> ExtractionMark {
        self.inner.node(node).map(|n| n.mark).unwrap_or_default()
    }

    pub fn need_all(&self, node: NodeId) -> bool {
        self.mark(node).need_all
    }

    pub fn skip_level(&self, node: NodeId) -> bool {
        self.mark(node).skip_level
    }

    pub fn has_children(&self, node: NodeId) -> bool {
        self.inner.has_children(node)
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.inner.children(node)
    }

    pub fn child(&self, node: NodeId, segment: &str) -> Option<NodeId> {
        self.inner.child(node, segment)
    }

    /// Child matching an object key: the literal key, else `*`.
    pub fn match_key(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.inner.match_key(node, key)
    }

    /// Child matching an array index: the literal index, else `[*]`.
    pub fn match_index(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.inner.match_index(node, index)
    }

    pub fn node_count(&self) -> usize {
        self.inner.len()
    }
}

/// Trie attaching caller rules to paths.
#[derive(Debug, Clone)]
pub struct ValueCollectingTrie<T> {
    inner: PathTrie<Vec<T>>,
}

impl<T> Default for ValueCollectingTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueCollectingTrie<T> {
    pub fn new() -> Self {
        Self {
            inner: PathTrie::new(),
        }
    }

    /// Attach `rule` at `path`. Rules at the same path accumulate.
    pub fn add_path(&mut self, path: &ObjectJsonPath, rule: T) -> NodeId {
        let id = self.inner.ensure(path);
        if let Some(node) = self.inner.node_mut(id) {
            node.mark.push(rule);
        }
        id
    }

    pub fn rules(&self, node: NodeId) -> &[T] {
        self.inner.node(node).map_or(&[], |n| n.mark.as_slice())
    }

    pub fn has_rules(&self, node: NodeId) -> bool {
        !self.rules(node).is_empty()
    }

    pub fn has_children(&self, node: NodeId) -> bool {
        self.inner.has_children(node)
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.inner.children(node)
    }

    pub fn child(&self, node: NodeId, segment: &str) -> Option<NodeId> {
        self.inner.child(node, segment)
    }

    pub fn match_key(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.inner.match_key(node, key)
    }

    pub fn match_index(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.inner.match_index(node, index)
    }

    pub fn node_count(&self) -> usize {
        self.inner.len()
    }
}
