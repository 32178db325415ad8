use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use slab::Slab;

use crate::error::LayoutError;

pub type NodeId = usize;

/// A document shared between the grids that mutate it and the code that observes it.
pub type SharedDocument = Arc<RwLock<Document>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.data {
            NodeData::Element { attributes, .. } if name.bytes().any(|b| b.is_ascii_uppercase()) => {
                attributes.get(&name.to_ascii_lowercase()).map(String::as_str)
            }
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or_default().split_ascii_whitespace()
    }
}

/// Slab-backed node tree. Detached nodes stay alive until `remove_subtree` frees them.
#[derive(Debug)]
pub struct Document {
    nodes: Slab<Node>,
    root: NodeId,
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let entry = nodes.vacant_entry();
        let root = entry.key();
        entry.insert(Node {
            id: root,
            parent: None,
            children: Vec::new(),
            data: NodeData::Document,
        });

        Self { nodes, root }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        self.nodes.len() <= 1
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_element)
    }

    fn node(&self, id: NodeId) -> Result<&Node, LayoutError> {
        self.nodes.get(id).ok_or(LayoutError::MissingNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, LayoutError> {
        self.nodes.get_mut(id).ok_or(LayoutError::MissingNode(id))
    }

    fn create_node(&mut self, data: NodeData) -> NodeId {
        let entry = self.nodes.vacant_entry();
        let id = entry.key();
        entry.insert(Node {
            id,
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create_node(NodeData::Text(text.to_string()))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
            .collect()
    }

    /// True if `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Unlinks `id` from its parent, leaving the subtree intact.
    pub fn detach(&mut self, id: NodeId) -> Result<(), LayoutError> {
        if id == self.root {
            return Err(LayoutError::RootImmutable);
        }
        let parent = self.node_mut(id)?.parent.take();
        if let Some(parent) = parent {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|&child| child != id);
            }
        }
        Ok(())
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), LayoutError> {
        self.node(parent)?;
        self.node(child)?;
        if child == self.root {
            return Err(LayoutError::RootImmutable);
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(LayoutError::Hierarchy { parent, child });
        }
        Ok(())
    }

    /// Appends `child` to `parent`, moving it out of its current parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), LayoutError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Inserts `child` before whatever currently sits at `index`, or appends when
    /// `index` is past the end.
    pub fn insert_child_at(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), LayoutError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        let children = &mut self.node_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        Ok(())
    }

    /// Detaches every child of `parent` and returns them in order.
    pub fn take_children(&mut self, parent: NodeId) -> Result<Vec<NodeId>, LayoutError> {
        let children = std::mem::take(&mut self.node_mut(parent)?.children);
        for &child in &children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
        }
        Ok(children)
    }

    /// Detaches `id` and frees it together with all of its descendants.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), LayoutError> {
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.try_remove(current) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Copies `id` and its subtree into new detached nodes.
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId, LayoutError> {
        let node = self.node(id)?;
        let data = node.data.clone();
        let children = node.children.clone();

        let clone = self.create_node(data);
        for child in children {
            let child_clone = self.deep_clone(child)?;
            self.append_child(clone, child_clone)?;
        }
        Ok(clone)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|node| node.attribute(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), LayoutError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element { attributes, .. } => {
                attributes.insert(name.to_ascii_lowercase(), value.into());
                Ok(())
            }
            _ => Err(LayoutError::NotAnElement(id)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        match &mut self.nodes.get_mut(id)?.data {
            NodeData::Element { attributes, .. } => attributes.remove(&name.to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn data(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attribute(id, &format!("data-{key}"))
    }

    pub fn set_data(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl ToString,
    ) -> Result<(), LayoutError> {
        self.set_attribute(id, &format!("data-{key}"), value.to_string())
    }

    pub fn remove_data(&mut self, id: NodeId, key: &str) -> Option<String> {
        self.remove_attribute(id, &format!("data-{key}"))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.classes().any(|c| c == class))
    }

    pub fn set_class(&mut self, id: NodeId, classes: &str) -> Result<(), LayoutError> {
        self.set_attribute(id, "class", classes)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), LayoutError> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let joined = match self.attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_class(id, &joined)
    }

    /// Whether the element would produce a box. Only inline state is consulted:
    /// a `hidden` attribute or a `display: none` declaration in `style`.
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.attribute("hidden").is_some() {
            return false;
        }
        let Some(style) = node.attribute("style") else {
            return true;
        };
        !style.split(';').any(|declaration| {
            let mut parts = declaration.splitn(2, ':');
            let property = parts.next().unwrap_or_default().trim();
            let value = parts.next().unwrap_or_default().trim();
            property.eq_ignore_ascii_case("display") && value.eq_ignore_ascii_case("none")
        })
    }

    /// Serializes the subtree rooted at `id`. Attributes are emitted in name order.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Document => {
                for &child in &node.children {
                    self.write_html(child, out);
                }
            }
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                for &child in &node.children {
                    self.write_html(child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Poison-tolerant accessors for a [`SharedDocument`].
pub trait DocumentLock {
    fn read_doc(&self) -> RwLockReadGuard<'_, Document>;
    fn write_doc(&self) -> RwLockWriteGuard<'_, Document>;
}

impl DocumentLock for SharedDocument {
    fn read_doc(&self) -> RwLockReadGuard<'_, Document> {
        self.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_doc(&self) -> RwLockWriteGuard<'_, Document> {
        self.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
