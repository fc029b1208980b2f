//! Arena-backed XML element tree.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`]. Structural
//! edits only rewrite parent/child links, so a `NodeId` held elsewhere (for
//! example by a track wrapper) stays valid for the lifetime of the tree.
//! Detached nodes remain allocated but are unreachable from the root.

/// Stable index of a node inside one [`XmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single element.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Character data before the first child element.
    pub text: Option<String>,
    /// Character data after this element's end tag.
    pub tail: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: None,
            tail: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An XML element tree with a single root.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlTree {
    /// Create a tree holding only a root element.
    pub fn new(root_tag: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::new(root_tag)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        &self.nodes[id.0].attributes
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attrs = &mut self.node_mut(id).attributes;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => attrs.push((name.to_string(), value)),
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].text.as_deref()
    }

    pub fn set_text(&mut self, id: NodeId, text: Option<String>) {
        self.node_mut(id).text = text;
    }

    pub fn tail(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].tail.as_deref()
    }

    pub fn set_tail(&mut self, id: NodeId, tail: Option<String>) {
        self.node_mut(id).tail = tail;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// First child element with the given tag.
    pub fn child(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.tag(c) == tag)
    }

    /// Follow a path of child tags from `start`.
    pub fn find_path(&self, start: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(start, |node, tag| self.child(node, tag))
    }

    /// All nodes reachable from `start`, in depth-first pre-order.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Allocate a detached element.
    pub fn new_element(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut node = Node::new(tag);
        node.attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Unlink a node from its parent. No-op for the root or detached nodes.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.node_mut(parent).children.retain(|&c| c != id);
        }
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.node_mut(child).parent = None;
        }
    }

    /// Deep-copy the subtree rooted at `node` in `source` into this arena.
    /// Returns the detached copy's root.
    pub fn import_subtree(&mut self, source: &XmlTree, node: NodeId) -> NodeId {
        let src = source.node(node);
        let mut copy = Node::new(src.tag.clone());
        copy.attributes = src.attributes.clone();
        copy.text = src.text.clone();
        copy.tail = src.tail.clone();
        self.nodes.push(copy);
        let new_id = NodeId(self.nodes.len() - 1);
        for &child in source.children(node) {
            let new_child = self.import_subtree(source, child);
            self.node_mut(new_child).parent = Some(new_id);
            self.node_mut(new_id).children.push(new_child);
        }
        new_id
    }

    /// Deep-copy the subtree rooted at `node` into a fresh, compact tree.
    pub fn extract_subtree(&self, node: NodeId) -> XmlTree {
        let mut tree = XmlTree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = tree.import_subtree(self, node);
        tree.root = root;
        tree.node_mut(root).tail = None;
        tree
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.descendants(self.root).len()
    }
}
