//! Controller instance storage

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;
use tether_dom::{Document, NodeId};

use crate::definition::ControllerClass;
use crate::properties::{PropertyChange, PropertyStore};
use crate::{Controller, ControllerId};

pub(crate) struct InstanceRecord {
    pub host: NodeId,
    pub token: String,
    pub class: Rc<ControllerClass>,
    /// Taken out while one of its hooks runs
    pub behavior: Option<Box<dyn Controller>>,
    pub properties: PropertyStore,
    /// Target sets by type, in connection order
    pub targets: BTreeMap<String, Vec<NodeId>>,
    /// Remote action bindings currently attached to this instance
    pub remote_actions: Vec<(NodeId, String)>,
    pub connected: bool,
}

impl InstanceRecord {
    pub fn new(
        host: NodeId,
        class: Rc<ControllerClass>,
        behavior: Box<dyn Controller>,
        properties: PropertyStore,
    ) -> Self {
        Self {
            host,
            token: class.token().to_string(),
            class,
            behavior: Some(behavior),
            properties,
            targets: BTreeMap::new(),
            remote_actions: Vec::new(),
            connected: false,
        }
    }

    pub fn targets(&self, target_type: &str) -> &[NodeId] {
        self.targets.get(target_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.class.syncer().get(&self.properties, name)
    }
}

/// All instances, dormant or connected
///
/// Ids are never reused, so a stale id cannot reach a newer instance.
#[derive(Default)]
pub(crate) struct Instances {
    records: BTreeMap<ControllerId, InstanceRecord>,
    by_host: HashMap<NodeId, Vec<(String, ControllerId)>>,
    next_id: u32,
}

impl Instances {
    pub fn insert(&mut self, record: InstanceRecord) -> ControllerId {
        let id = ControllerId(self.next_id);
        self.next_id += 1;
        self.by_host
            .entry(record.host)
            .or_default()
            .push((record.token.clone(), id));
        self.records.insert(id, record);
        id
    }

    pub fn get(&self, id: ControllerId) -> Option<&InstanceRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: ControllerId) -> Option<&mut InstanceRecord> {
        self.records.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Instance for (host, token)
    pub fn find(&self, host: NodeId, token: &str) -> Option<ControllerId> {
        self.by_host
            .get(&host)?
            .iter()
            .find(|(t, _)| t == token)
            .map(|&(_, id)| id)
    }

    /// Instances on `host` in creation order
    pub fn on_host(&self, host: NodeId) -> Vec<(String, ControllerId)> {
        self.by_host.get(&host).cloned().unwrap_or_default()
    }

    pub fn has_instances(&self, host: NodeId) -> bool {
        self.by_host.get(&host).is_some_and(|list| !list.is_empty())
    }

    /// Forget an instance entirely
    pub fn remove(&mut self, id: ControllerId) -> Option<InstanceRecord> {
        let record = self.records.remove(&id)?;
        if let Some(list) = self.by_host.get_mut(&record.host) {
            list.retain(|&(_, other)| other != id);
            if list.is_empty() {
                self.by_host.remove(&record.host);
            }
        }
        Some(record)
    }

    pub fn connected_ids(&self) -> Vec<ControllerId> {
        self.records
            .iter()
            .filter(|(_, record)| record.connected)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Route a property write through the instance's syncer
    pub fn set_property(
        &mut self,
        document: &mut Document,
        id: ControllerId,
        name: &str,
        value: Value,
        sync: bool,
    ) -> Option<PropertyChange> {
        let record = self.get_mut(id)?;
        let class = Rc::clone(&record.class);
        class
            .syncer()
            .set(document, record.host, &mut record.properties, name, value, sync)
    }

    /// Apply and consume the host's bulk property attribute
    pub fn reinit(&mut self, document: &mut Document, id: ControllerId) -> Vec<PropertyChange> {
        let Some(record) = self.get_mut(id) else {
            return Vec::new();
        };
        let class = Rc::clone(&record.class);
        class.syncer().reinit(document, record.host, &mut record.properties)
    }
}
