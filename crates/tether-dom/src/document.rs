//! Document - High-level document API
//!
//! Every structural or attribute change made through `Document` queues
//! mutation records for the observers that asked for them.

use crate::events::ListenerRegistry;
use crate::mutation::ObserverRegistry;
use crate::{
    DomError, DomResult, DomTree, ElementData, EventListener, HandlerId, ListenerOptions,
    MutationObserverInit, MutationRecord, NodeData, NodeId, ObserverId, Selector,
};

/// HTML Document
#[derive(Debug)]
pub struct Document {
    /// The DOM tree
    tree: DomTree,
    observers: ObserverRegistry,
    listeners: ListenerRegistry,
    /// Cached reference to <html> element
    html_element: NodeId,
    /// Cached reference to <head> element
    head_element: NodeId,
    /// Cached reference to <body> element
    body_element: NodeId,
}

impl Document {
    /// Create a document with `<html><head></head><body></body></html>`
    pub fn new() -> Self {
        let mut tree = DomTree::new();

        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");

        tree.append_child(tree.root(), html);
        tree.append_child(html, head);
        tree.append_child(html, body);

        Self {
            tree,
            observers: ObserverRegistry::default(),
            listeners: ListenerRegistry::default(),
            html_element: html,
            head_element: head,
            body_element: body,
        }
    }

    /// Create an empty document (no structure)
    pub fn empty() -> Self {
        Self {
            tree: DomTree::new(),
            observers: ObserverRegistry::default(),
            listeners: ListenerRegistry::default(),
            html_element: NodeId::NONE,
            head_element: NodeId::NONE,
            body_element: NodeId::NONE,
        }
    }

    /// Locate `<html>`, `<head>` and `<body>` after the tree was built by hand
    pub fn finalize(&mut self) {
        self.html_element = self
            .tree
            .children(NodeId::ROOT)
            .find(|(_, n)| n.as_element().is_some_and(|e| e.tag == "html"))
            .map_or(NodeId::NONE, |(id, _)| id);
        if !self.html_element.is_valid() {
            return;
        }
        for (id, node) in self.tree.children(self.html_element) {
            match node.as_element().map(|e| e.tag.as_str()) {
                Some("head") => self.head_element = id,
                Some("body") => self.body_element = id,
                _ => {}
            }
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get <html> element
    pub fn document_element(&self) -> NodeId {
        self.html_element
    }

    /// Get <head> element
    pub fn head(&self) -> NodeId {
        self.head_element
    }

    /// Get <body> element
    pub fn body(&self) -> NodeId {
        self.body_element
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.tree.create_element(tag)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.create_text(text)
    }

    /// Create a detached comment
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.tree.create_comment(text)
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    /// Append a child node, moving it if it is already attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end)
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> DomResult<NodeId> {
        let parent_node = self.tree.get(parent).ok_or(DomError::NotFound)?;
        if matches!(parent_node.data, NodeData::Text(_) | NodeData::Comment(_)) {
            return Err(DomError::HierarchyRequest);
        }
        let child_node = self.tree.get(child).ok_or(DomError::NotFound)?;
        if matches!(child_node.data, NodeData::Document) {
            return Err(DomError::HierarchyRequest);
        }
        if self.tree.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest);
        }
        if let Some(reference) = reference {
            if self.tree.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild);
            }
            if reference == child {
                return Ok(child);
            }
        }

        if self.tree.parent(child).is_some() {
            self.detach_with_record(child);
        }

        let reference = reference.unwrap_or(NodeId::NONE);
        self.tree.insert_before(parent, child, reference);
        let prev = self.tree.get(child).map_or(NodeId::NONE, |n| n.prev_sibling);
        let record = MutationRecord::child_list(parent, vec![child], Vec::new(), prev, reference);
        self.observers.queue(&self.tree, record);
        Ok(child)
    }

    /// Remove a child node
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        if self.tree.get(child).is_none() {
            return Err(DomError::NotFound);
        }
        if self.tree.parent(child) != Some(parent) {
            return Err(DomError::NotAChild);
        }
        self.detach_with_record(child);
        Ok(child)
    }

    /// Detach a node from its parent; detached nodes are left alone
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        if self.tree.get(node).is_none() {
            return Err(DomError::NotFound);
        }
        if self.tree.parent(node).is_some() {
            self.detach_with_record(node);
        }
        Ok(())
    }

    fn detach_with_record(&mut self, child: NodeId) {
        if let Some((parent, prev, next)) = self.tree.detach(child) {
            let record = MutationRecord::child_list(parent, Vec::new(), vec![child], prev, next);
            self.observers.queue(&self.tree, record);
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    fn element_mut(&mut self, node: NodeId) -> DomResult<&mut ElementData> {
        self.tree
            .get_mut(node)
            .ok_or(DomError::NotFound)?
            .as_element_mut()
            .ok_or(DomError::InvalidNodeType)
    }

    /// Element data, if `node` is an element
    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.tree.get(node)?.as_element()
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        let name = name.to_ascii_lowercase();
        let old = self.element_mut(node)?.set_attr(&name, value.to_string());
        self.observers
            .queue(&self.tree, MutationRecord::attribute(node, &name, old));
        Ok(())
    }

    /// Remove an attribute; returns whether it was present
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<bool> {
        let name = name.to_ascii_lowercase();
        match self.element_mut(node)?.remove_attr(&name) {
            Some(old) => {
                self.observers
                    .queue(&self.tree, MutationRecord::attribute(node, &name, Some(old)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Toggle a presence attribute; returns whether it is now present
    pub fn toggle_attribute(&mut self, node: NodeId, name: &str, force: Option<bool>) -> DomResult<bool> {
        let present = self.has_attribute(node, name);
        match force.unwrap_or(!present) {
            true => {
                if !present {
                    self.set_attribute(node, name, "")?;
                }
                Ok(true)
            }
            false => {
                self.remove_attribute(node, name)?;
                Ok(false)
            }
        }
    }

    /// Get an attribute value
    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.get_attr(name)
    }

    /// Check if attribute exists
    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.get_attribute(node, name).is_some()
    }

    /// All attributes of an element as `(name, value)` pairs
    pub fn attributes(&self, node: NodeId) -> Vec<(&str, &str)> {
        self.element(node)
            .map(|e| e.attrs.iter().map(|a| (a.name.as_str(), a.value.as_str())).collect())
            .unwrap_or_default()
    }

    /// Lowercased tag name
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    // ------------------------------------------------------------------
    // Traversal and queries
    // ------------------------------------------------------------------

    /// Parent of a node
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.parent(node)
    }

    /// Child node IDs
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.children(node).map(|(id, _)| id).collect()
    }

    /// Inclusive descendant elements in preorder
    pub fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .descendants(node)
            .into_iter()
            .filter(|&id| self.tree.get(id).is_some_and(|n| n.is_element()))
            .collect()
    }

    /// Whether the node is part of the document tree
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.tree.ancestors(node).last() == Some(NodeId::ROOT)
    }

    /// Get element by ID (first in tree order, connected elements only)
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.tree
            .descendants(NodeId::ROOT)
            .into_iter()
            .find(|&node| self.element(node).and_then(ElementData::id) == Some(id))
    }

    /// Check if element matches selector
    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.element(node).is_some_and(|e| selector.matches(e))
    }

    /// Nearest inclusive ancestor element matching `selector`
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        self.tree.ancestors(node).find(|&id| self.matches(id, selector))
    }

    /// First inclusive descendant matching `selector`
    pub fn query_selector(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.tree
            .descendants(root)
            .into_iter()
            .find(|&id| self.matches(id, selector))
    }

    /// All inclusive descendants matching `selector`
    pub fn query_selector_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.tree
            .descendants(root)
            .into_iter()
            .filter(|&id| self.matches(id, selector))
            .collect()
    }

    /// Text content of a node and its descendants
    pub fn text_content(&self, node: NodeId) -> String {
        self.tree
            .descendants(node)
            .into_iter()
            .filter_map(|id| self.tree.get(id)?.as_text())
            .collect()
    }

    // ------------------------------------------------------------------
    // Mutation observers
    // ------------------------------------------------------------------

    pub fn create_mutation_observer(&mut self) -> ObserverId {
        self.observers.create()
    }

    pub fn observe(&mut self, observer: ObserverId, target: NodeId, options: MutationObserverInit) {
        self.observers.observe(observer, target, options);
    }

    pub fn unobserve(&mut self, observer: ObserverId, target: NodeId) {
        self.observers.unobserve(observer, target);
    }

    pub fn is_observing(&self, observer: ObserverId, target: NodeId) -> bool {
        self.observers.is_observing(observer, target)
    }

    /// Stop observing everything and drop undelivered records
    pub fn disconnect_observer(&mut self, observer: ObserverId) {
        self.observers.disconnect(observer);
    }

    /// Take the records queued for `observer`
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers.take_records(observer)
    }

    pub fn has_pending_records(&self) -> bool {
        self.observers.has_pending()
    }

    // ------------------------------------------------------------------
    // Event listeners
    // ------------------------------------------------------------------

    /// Add an event listener; duplicates (same handler and capture) are ignored
    pub fn add_event_listener(
        &mut self,
        node: NodeId,
        event_type: &str,
        handler_id: HandlerId,
        options: ListenerOptions,
    ) -> bool {
        self.listeners
            .add(node, event_type, EventListener { handler_id, options })
    }

    /// Remove an event listener
    pub fn remove_event_listener(&mut self, node: NodeId, event_type: &str, handler_id: HandlerId, capture: bool) -> bool {
        self.listeners.remove(node, event_type, handler_id, capture)
    }

    /// Snapshot of the listeners registered on a node
    pub fn listeners(&self, node: NodeId, event_type: &str) -> Vec<EventListener> {
        self.listeners.get(node, event_type)
    }

    /// Propagation path from the outermost ancestor down to `target`
    pub fn event_path(&self, target: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = self.tree.ancestors(target).collect();
        path.reverse();
        path
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
