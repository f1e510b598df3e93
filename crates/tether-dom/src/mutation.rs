//! Mutation Observers
//!
//! Records are queued while the tree changes and handed out by
//! [`Document::take_records`](crate::Document::take_records). Nothing is
//! delivered synchronously: the embedder decides when its "microtask
//! checkpoint" happens.

use crate::{DomTree, NodeId};

/// Mutation observer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u32);

/// Mutation observer options
#[derive(Debug, Clone, Default)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
    pub attribute_old_value: bool,
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    fn wants(&self, record: &MutationRecord) -> bool {
        match record.mutation_type {
            MutationType::ChildList => self.child_list,
            MutationType::Attributes => {
                self.attributes
                    && match (&self.attribute_filter, &record.attribute_name) {
                        (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                        _ => true,
                    }
            }
        }
    }
}

/// Mutation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub(crate) fn child_list(
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        previous_sibling: NodeId,
        next_sibling: NodeId,
    ) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            previous_sibling: previous_sibling.option(),
            next_sibling: next_sibling.option(),
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn attribute(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            previous_sibling: None,
            next_sibling: None,
            attribute_name: Some(name.to_string()),
            old_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

#[derive(Debug, Default)]
struct MutationObserver {
    observed: Vec<(NodeId, MutationObserverInit)>,
    records: Vec<MutationRecord>,
}

/// All observers registered on one document
#[derive(Debug, Default)]
pub(crate) struct ObserverRegistry {
    observers: Vec<MutationObserver>,
}

impl ObserverRegistry {
    pub fn create(&mut self) -> ObserverId {
        let id = ObserverId(self.observers.len() as u32);
        self.observers.push(MutationObserver::default());
        id
    }

    /// Observe `target`; observing the same target again replaces its options
    pub fn observe(&mut self, id: ObserverId, target: NodeId, options: MutationObserverInit) {
        let Some(observer) = self.observers.get_mut(id.0 as usize) else {
            return;
        };
        match observer.observed.iter_mut().find(|(node, _)| *node == target) {
            Some(entry) => entry.1 = options,
            None => observer.observed.push((target, options)),
        }
    }

    pub fn unobserve(&mut self, id: ObserverId, target: NodeId) {
        if let Some(observer) = self.observers.get_mut(id.0 as usize) {
            observer.observed.retain(|(node, _)| *node != target);
        }
    }

    pub fn is_observing(&self, id: ObserverId, target: NodeId) -> bool {
        self.observers
            .get(id.0 as usize)
            .is_some_and(|o| o.observed.iter().any(|(node, _)| *node == target))
    }

    /// Drop every registration and any undelivered records
    pub fn disconnect(&mut self, id: ObserverId) {
        if let Some(observer) = self.observers.get_mut(id.0 as usize) {
            observer.observed.clear();
            observer.records.clear();
        }
    }

    pub fn take_records(&mut self, id: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .get_mut(id.0 as usize)
            .map(|o| std::mem::take(&mut o.records))
            .unwrap_or_default()
    }

    pub fn has_pending(&self) -> bool {
        self.observers.iter().any(|o| !o.records.is_empty())
    }

    /// Queue `record` for every interested observer (at most once each)
    pub fn queue(&mut self, tree: &DomTree, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        let ancestors: Vec<NodeId> = tree.ancestors(record.target).collect();

        for observer in &mut self.observers {
            let interested = observer.observed.iter().find(|(node, options)| {
                let in_scope = *node == record.target || (options.subtree && ancestors.contains(node));
                in_scope && options.wants(&record)
            });
            if let Some((_, options)) = interested {
                let mut record = record.clone();
                if record.mutation_type == MutationType::Attributes && !options.attribute_old_value {
                    record.old_value = None;
                }
                tracing::trace!(target = %record.target, kind = ?record.mutation_type, "queued mutation record");
                observer.records.push(record);
            }
        }
    }
}
