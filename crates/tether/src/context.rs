//! Hook context
//!
//! Every hook and action receives a [`Context`] scoped to the instance it
//! runs for. Property writes go through the instance's syncer; the
//! resulting `property_changed` calls run after the current hook returns.

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_dom::{Document, NodeId};

use crate::ControllerId;
use crate::controller::Hook;
use crate::instances::Instances;

/// Hook queued for after the running one
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingHook {
    pub id: ControllerId,
    pub hook: Hook,
}

/// Access to the document and the running instance's state
pub struct Context<'a> {
    pub(crate) document: &'a mut Document,
    pub(crate) instances: &'a mut Instances,
    pub(crate) pending: &'a mut VecDeque<PendingHook>,
    pub(crate) id: ControllerId,
}

impl Context<'_> {
    /// The running instance
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Host element of the running instance
    pub fn element(&self) -> NodeId {
        self.instances.get(self.id).map_or(NodeId::NONE, |r| r.host)
    }

    pub fn token(&self) -> &str {
        self.instances.get(self.id).map_or("", |r| r.token.as_str())
    }

    pub fn document(&self) -> &Document {
        self.document
    }

    /// Mutations are observed; their effects apply at the next flush
    pub fn document_mut(&mut self) -> &mut Document {
        self.document
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.property_of(self.id, name)
    }

    /// Property deserialized into `T`
    pub fn property_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.property(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Assign a declared property; `false` when `name` is not declared
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set_property_of(self.id, name, value)
    }

    /// Read a property of another instance (an injected sibling, say)
    pub fn property_of(&self, id: ControllerId, name: &str) -> Option<&Value> {
        self.instances.get(id)?.property(name)
    }

    pub fn set_property_of(&mut self, id: ControllerId, name: &str, value: impl Into<Value>) -> bool {
        let declared = self
            .instances
            .get(id)
            .is_some_and(|r| r.class.syncer().is_declared(name));
        if !declared {
            return false;
        }
        if let Some(change) = self
            .instances
            .set_property(self.document, id, name, value.into(), true)
        {
            self.pending.push_back(PendingHook {
                id,
                hook: change.into(),
            });
        }
        true
    }

    /// Connected targets of `target_type`, in connection order
    pub fn targets(&self, target_type: &str) -> &[NodeId] {
        self.instances
            .get(self.id)
            .map(|r| r.targets(target_type))
            .unwrap_or(&[])
    }

    /// First connected target of `target_type`
    pub fn target(&self, target_type: &str) -> Option<NodeId> {
        self.targets(target_type).first().copied()
    }

    /// Instance of `token` on the same host
    pub fn injected(&self, token: &str) -> Option<ControllerId> {
        self.instances.find(self.element(), token)
    }
}
