//! Connector
//!
//! Mutation-driven bookkeeping of hosts, targets and actions.
//!
//! A structural observer watches the whole document for child-list changes
//! and for the host, target and action attributes. A second observer
//! watches every attribute of elements that host at least one instance and
//! drives property sync. Records are processed in [`Application::flush`].
//!
//! Side tables are keyed by `(element, raw descriptor)`:
//!
//! - links: target declarations and the instance they are connected to
//! - bindings: action declarations and their native listener
//! - orphans: remote declarations waiting for a host id to appear

use std::collections::HashMap;
use std::rc::Rc;

use tether_dom::{HandlerId, MutationObserverInit, MutationRecord, MutationType, NodeId, ObserverId, Selector};

use crate::action::{ActionDescriptor, split_descriptors};
use crate::app::Handler;
use crate::controller::Hook;
use crate::instances::InstanceRecord;
use crate::link::{ElementLink, LinkDescriptor, LinkState};
use crate::properties::AttributeOutcome;
use crate::{Application, ControllerId, Diagnostic};

/// Attribute that makes an element addressable by remote descriptors
const ID_ATTRIBUTE: &str = "id";

type Keyed<T> = HashMap<NodeId, Vec<(String, T)>>;

/// Declared action on one element
#[derive(Debug, Clone)]
pub(crate) struct ActionBinding {
    pub descriptor: ActionDescriptor,
    pub event_type: String,
    pub state: BindingState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingState {
    Detached,
    /// Remote binding waiting for its host id
    Orphaned,
    /// Listener registered; `owner` is set for remote bindings
    Attached {
        handler: HandlerId,
        owner: Option<ControllerId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OrphanKind {
    Target,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Orphan {
    pub element: NodeId,
    pub kind: OrphanKind,
    pub descriptor: String,
    pub token: String,
}

/// Remote declarations waiting for a host id, indexed both ways
#[derive(Debug, Default)]
pub(crate) struct OrphanIndex {
    by_host_id: HashMap<String, Vec<Orphan>>,
    by_element: HashMap<NodeId, Vec<String>>,
}

impl OrphanIndex {
    pub fn add(&mut self, host_id: &str, orphan: Orphan) {
        let awaited = self.by_element.entry(orphan.element).or_default();
        if !awaited.iter().any(|id| id == host_id) {
            awaited.push(host_id.to_string());
        }
        let waiting = self.by_host_id.entry(host_id.to_string()).or_default();
        if !waiting.contains(&orphan) {
            waiting.push(orphan);
        }
    }

    /// Remove every orphan waiting for `host_id` that names `token`
    pub fn take(&mut self, host_id: &str, token: &str) -> Vec<Orphan> {
        let Some(waiting) = self.by_host_id.get_mut(host_id) else {
            return Vec::new();
        };
        let (taken, kept): (Vec<Orphan>, Vec<Orphan>) = waiting.drain(..).partition(|o| o.token == token);
        *waiting = kept;
        if waiting.is_empty() {
            self.by_host_id.remove(host_id);
        }
        for orphan in &taken {
            self.forget_if_done(orphan.element, host_id);
        }
        taken
    }

    pub fn remove(&mut self, element: NodeId, kind: OrphanKind, descriptor: &str) {
        let Some(awaited) = self.by_element.get(&element).cloned() else {
            return;
        };
        for host_id in awaited {
            if let Some(waiting) = self.by_host_id.get_mut(&host_id) {
                waiting.retain(|o| !(o.element == element && o.kind == kind && o.descriptor == descriptor));
                if waiting.is_empty() {
                    self.by_host_id.remove(&host_id);
                }
            }
            self.forget_if_done(element, &host_id);
        }
    }

    pub fn remove_element(&mut self, element: NodeId) {
        let Some(awaited) = self.by_element.remove(&element) else {
            return;
        };
        for host_id in awaited {
            if let Some(waiting) = self.by_host_id.get_mut(&host_id) {
                waiting.retain(|o| o.element != element);
                if waiting.is_empty() {
                    self.by_host_id.remove(&host_id);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.by_host_id.clear();
        self.by_element.clear();
    }

    pub fn len(&self) -> usize {
        self.by_host_id.values().map(Vec::len).sum()
    }

    /// Host ids `element` is waiting for
    #[cfg(test)]
    pub fn awaited_by(&self, element: NodeId) -> &[String] {
        self.by_element.get(&element).map(Vec::as_slice).unwrap_or(&[])
    }

    fn forget_if_done(&mut self, element: NodeId, host_id: &str) {
        let still_waiting = self
            .by_host_id
            .get(host_id)
            .is_some_and(|waiting| waiting.iter().any(|o| o.element == element));
        if still_waiting {
            return;
        }
        if let Some(awaited) = self.by_element.get_mut(&element) {
            awaited.retain(|id| id != host_id);
            if awaited.is_empty() {
                self.by_element.remove(&element);
            }
        }
    }
}

/// Side tables owned by the application
#[derive(Debug, Default)]
pub(crate) struct ConnectorState {
    pub structure_observer: Option<ObserverId>,
    pub attribute_observer: Option<ObserverId>,
    links: Keyed<ElementLink>,
    bindings: Keyed<ActionBinding>,
    pub orphans: OrphanIndex,
}

impl ConnectorState {
    pub fn link(&self, element: NodeId, raw: &str) -> Option<&ElementLink> {
        keyed_get(&self.links, element, raw)
    }

    fn link_mut(&mut self, element: NodeId, raw: &str) -> Option<&mut ElementLink> {
        keyed_get_mut(&mut self.links, element, raw)
    }

    pub fn binding(&self, element: NodeId, raw: &str) -> Option<&ActionBinding> {
        keyed_get(&self.bindings, element, raw)
    }

    fn binding_mut(&mut self, element: NodeId, raw: &str) -> Option<&mut ActionBinding> {
        keyed_get_mut(&mut self.bindings, element, raw)
    }

    /// Raw descriptors of the links on `element` connected to `id` as `target_type`
    fn links_connected_to(&self, element: NodeId, id: ControllerId, target_type: &str) -> Vec<String> {
        self.links
            .get(&element)
            .into_iter()
            .flatten()
            .filter(|(_, link)| link.state == LinkState::Connected(id) && link.descriptor.target_type == target_type)
            .map(|(raw, _)| raw.clone())
            .collect()
    }
}

fn keyed_get<'a, T>(table: &'a Keyed<T>, element: NodeId, raw: &str) -> Option<&'a T> {
    table.get(&element)?.iter().find(|(key, _)| key == raw).map(|(_, v)| v)
}

fn keyed_get_mut<'a, T>(table: &'a mut Keyed<T>, element: NodeId, raw: &str) -> Option<&'a mut T> {
    table
        .get_mut(&element)?
        .iter_mut()
        .find(|(key, _)| key == raw)
        .map(|(_, v)| v)
}

fn keyed_insert<T>(table: &mut Keyed<T>, element: NodeId, raw: &str, value: T) {
    let entries = table.entry(element).or_default();
    match entries.iter_mut().find(|(key, _)| key == raw) {
        Some((_, existing)) => *existing = value,
        None => entries.push((raw.to_string(), value)),
    }
}

fn keyed_remove<T>(table: &mut Keyed<T>, element: NodeId, raw: &str) -> Option<T> {
    let entries = table.get_mut(&element)?;
    let index = entries.iter().position(|(key, _)| key == raw)?;
    let (_, value) = entries.remove(index);
    if entries.is_empty() {
        table.remove(&element);
    }
    Some(value)
}

fn keyed_keys<T>(table: &Keyed<T>, element: NodeId) -> Vec<String> {
    table
        .get(&element)
        .map(|entries| entries.iter().map(|(key, _)| key.clone()).collect())
        .unwrap_or_default()
}

/// Tokens of `old` missing from `new`, in order
fn token_difference(old: &[String], new: &[String]) -> Vec<String> {
    old.iter().filter(|t| !new.contains(t)).cloned().collect()
}

fn split_tokens(value: Option<&str>) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in value.unwrap_or("").split_whitespace() {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

impl Application {
    // ------------------------------------------------------------------
    // Top-level operations
    // ------------------------------------------------------------------

    /// Start observing the document and connect everything already in it
    pub fn connect(&mut self) {
        if self.connected {
            return;
        }
        self.connected = true;

        // Observers outlive a disconnect and are reused on reconnect
        let structure = match self.connector.structure_observer {
            Some(observer) => observer,
            None => self.document.create_mutation_observer(),
        };
        self.document.observe(
            structure,
            NodeId::ROOT,
            MutationObserverInit {
                child_list: true,
                attributes: true,
                subtree: true,
                attribute_old_value: true,
                attribute_filter: Some(self.config.observed_attributes()),
            },
        );
        self.connector.structure_observer = Some(structure);
        if self.connector.attribute_observer.is_none() {
            self.connector.attribute_observer = Some(self.document.create_mutation_observer());
        }

        tracing::debug!("connecting document");
        self.handle_node_added(NodeId::ROOT);
        self.flush();
        tracing::debug!(
            instances = self.instances.len(),
            orphans = self.connector.orphans.len(),
            "document connected"
        );
    }

    /// Stop observing and disconnect every instance (instances stay dormant)
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.flush();
        let observers = [self.connector.structure_observer, self.connector.attribute_observer];
        for observer in observers.into_iter().flatten() {
            self.document.disconnect_observer(observer);
        }

        self.handle_node_removed(NodeId::ROOT);
        self.connector.orphans.clear();
        self.connected = false;
        tracing::debug!("disconnected document");
    }

    /// Process queued mutation records until none are left
    pub fn flush(&mut self) {
        loop {
            let structural = self
                .connector
                .structure_observer
                .map(|o| self.document.take_records(o))
                .unwrap_or_default();
            let attributes = self
                .connector
                .attribute_observer
                .map(|o| self.document.take_records(o))
                .unwrap_or_default();
            if structural.is_empty() && attributes.is_empty() {
                break;
            }

            tracing::trace!(structural = structural.len(), attributes = attributes.len(), "processing mutation records");
            for record in structural {
                self.process_structure_record(record);
            }
            for record in attributes {
                self.process_attribute_record(record);
            }
        }
    }

    fn process_structure_record(&mut self, record: MutationRecord) {
        match record.mutation_type {
            MutationType::ChildList => {
                for node in record.removed_nodes {
                    self.handle_node_removed(node);
                }
                for node in record.added_nodes {
                    if self.document.is_connected(node) {
                        self.handle_node_added(node);
                    }
                }
            }
            MutationType::Attributes => {
                let Some(name) = record.attribute_name else {
                    return;
                };
                if self.document.is_connected(record.target) {
                    self.attribute_value_changed(record.target, &name, record.old_value.as_deref());
                }
            }
        }
    }

    fn process_attribute_record(&mut self, record: MutationRecord) {
        let Some(name) = record.attribute_name.as_deref() else {
            return;
        };
        if name == self.config.scope_attribute {
            return;
        }
        let element = record.target;
        let current = self.document.get_attribute(element, name).map(str::to_string);

        for (token, id) in self.instances.on_host(element) {
            let Some(class) = self.instances.get(id).map(|r| Rc::clone(&r.class)) else {
                continue;
            };
            match class.syncer().on_attribute_mutated(name, current.as_deref()) {
                AttributeOutcome::Reinit => {
                    for change in self.instances.reinit(&mut self.document, id) {
                        self.call_hook(id, change.into());
                    }
                }
                AttributeOutcome::Set { name: property, value } => {
                    if let Some(change) = self
                        .instances
                        .set_property(&mut self.document, id, &property, value, false)
                    {
                        self.call_hook(id, change.into());
                    }
                }
                AttributeOutcome::PassThrough => self.call_hook(
                    id,
                    Hook::AttributeChanged {
                        name: name.to_string(),
                        old: record.old_value.clone(),
                        new: current.clone(),
                    },
                ),
                AttributeOutcome::Ignore => {}
            }

            if name == ID_ATTRIBUTE && current.is_some() && self.is_controller_connected(id) {
                self.resolve_orphans(element, &token);
            }
        }
    }

    // ------------------------------------------------------------------
    // Subtree protocols
    // ------------------------------------------------------------------

    /// Hosts first, then targets and actions, then selector callbacks
    pub(crate) fn handle_node_added(&mut self, node: NodeId) {
        let elements = self.document.descendant_elements(node);
        tracing::trace!(%node, elements = elements.len(), "node added");

        for &element in &elements {
            if !self.document.is_connected(element) {
                continue;
            }
            self.forget_undeclared(element);
            let tokens = self.declared_host_tokens(element);
            self.host_tokens_added(element, &tokens, false);
        }

        for &element in &elements {
            if !self.document.is_connected(element) {
                continue;
            }
            let targets = self.declared_target_descriptors(element);
            self.child_tokens_added(element, &targets);
            let actions = self.declared_action_descriptors(element);
            self.handler_el_added(element, &actions);
        }

        let callbacks = self.registry.selector_callbacks().to_vec();
        if callbacks.is_empty() {
            return;
        }
        for &element in &elements {
            for (selector, callback) in &callbacks {
                if self.document.is_connected(element) && self.document.matches(element, selector) {
                    callback(&mut self.document, element);
                }
            }
        }
    }

    /// Actions and targets of the whole subtree first, then hosts innermost first
    pub(crate) fn handle_node_removed(&mut self, node: NodeId) {
        let elements = self.document.descendant_elements(node);
        tracing::trace!(%node, elements = elements.len(), "node removed");

        for &element in &elements {
            self.teardown_element(element);
        }
        for &element in elements.iter().rev() {
            for (_, id) in self.instances.on_host(element).into_iter().rev() {
                self.disconnect_instance(id);
            }
        }
    }

    /// Drop every link, binding and orphan entry of `element`
    pub(crate) fn teardown_element(&mut self, element: NodeId) {
        for raw in keyed_keys(&self.connector.bindings, element) {
            self.remove_binding(element, &raw);
        }
        for raw in keyed_keys(&self.connector.links, element) {
            self.remove_link(element, &raw);
        }
        self.connector.orphans.remove_element(element);
    }

    /// Removed roles first, then added ones, within one record
    fn attribute_value_changed(&mut self, element: NodeId, name: &str, old: Option<&str>) {
        let current = self.document.get_attribute(element, name).map(str::to_string);
        let is_host = name == self.config.controller_attribute;
        let is_target = name == self.config.target_attribute;

        if is_host || is_target {
            let old_tokens = split_tokens(old);
            let new_tokens = split_tokens(current.as_deref());
            let (removed_targets, removed_hosts): (Vec<String>, Vec<String>) = token_difference(&old_tokens, &new_tokens)
                .into_iter()
                .partition(|t| t.contains('.'));
            let (added_targets, added_hosts): (Vec<String>, Vec<String>) = token_difference(&new_tokens, &old_tokens)
                .into_iter()
                .partition(|t| t.contains('.'));

            if is_target {
                self.child_tokens_removed(element, &removed_targets);
            }
            if is_host && !removed_hosts.is_empty() {
                self.forget_undeclared(element);
            }
            if is_host && !added_hosts.is_empty() {
                self.host_tokens_added(element, &added_hosts, true);
            }
            if is_target {
                self.child_tokens_added(element, &added_targets);
            }
        }

        if name == self.config.action_attribute {
            let old_descriptors: Vec<String> = split_descriptors(old.unwrap_or("")).into_iter().map(String::from).collect();
            let new_descriptors: Vec<String> = split_descriptors(current.as_deref().unwrap_or(""))
                .into_iter()
                .map(String::from)
                .collect();
            self.handler_el_removed(element, &token_difference(&old_descriptors, &new_descriptors));
            self.handler_el_added(element, &token_difference(&new_descriptors, &old_descriptors));
        }
    }

    // ------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------

    /// Instantiate `tokens` on `element` and connect every dormant instance there
    fn host_tokens_added(&mut self, element: NodeId, tokens: &[String], rescan: bool) {
        for token in tokens {
            self.instantiate(element, token, None);
        }
        if !self.instances.has_instances(element) {
            return;
        }
        self.update_scope(element);
        self.observe_host(element);
        if !self.document.is_connected(element) {
            return;
        }

        for (token, id) in self.instances.on_host(element) {
            if self.is_controller_connected(id) {
                continue;
            }
            self.call_hook(id, Hook::Connected);
            if let Some(record) = self.instances.get_mut(id) {
                record.connected = true;
            }
            tracing::debug!(%token, %element, %id, "controller connected");

            self.resolve_orphans(element, &token);
            if rescan {
                self.rescan_targets(element, &token);
            }
        }
    }

    /// Create the instance for (element, token), injected tokens first
    fn instantiate(
        &mut self,
        element: NodeId,
        token: &str,
        overrides: Option<&crate::Params>,
    ) -> Option<ControllerId> {
        if let Some(id) = self.instances.find(element, token) {
            return Some(id);
        }
        let Some(class) = self.registry.get(token) else {
            self.report(Diagnostic::UnknownController {
                token: token.to_string(),
                element,
            });
            return None;
        };

        for (injected, injected_overrides) in class.injects() {
            self.instantiate(element, injected, Some(injected_overrides));
        }

        let behavior = class.create();
        let properties = class.syncer().init(&mut self.document, element, overrides);
        let id = self
            .instances
            .insert(InstanceRecord::new(element, Rc::clone(&class), behavior, properties));
        tracing::debug!(token, %element, %id, "controller created");
        self.call_hook(id, Hook::Initialized);
        Some(id)
    }

    /// Disconnect and forget instances whose token is no longer declared or injected
    fn forget_undeclared(&mut self, element: NodeId) {
        if !self.instances.has_instances(element) {
            return;
        }
        let required = self.required_tokens(element);
        let mut orphaned_locals = Vec::new();
        let mut forgot = false;

        for (token, id) in self.instances.on_host(element).into_iter().rev() {
            if required.contains(&token) {
                continue;
            }
            orphaned_locals.extend(self.disconnect_instance(id));
            self.instances.remove(id);
            tracing::debug!(%token, %element, %id, "controller removed");
            forgot = true;
        }
        if !forgot {
            return;
        }

        self.update_scope(element);
        if !self.instances.has_instances(element) {
            self.unobserve_host(element);
        }
        // Local targets may now belong to an outer host with the same token
        for (target, raw) in orphaned_locals {
            if self.document.is_connected(target) && self.connector.link(target, &raw).is_some() {
                self.child_tokens_added(target, std::slice::from_ref(&raw));
            }
        }
    }

    /// Evict targets and remote actions, then run `disconnected`
    ///
    /// Returns the local links that were disconnected.
    pub(crate) fn disconnect_instance(&mut self, id: ControllerId) -> Vec<(NodeId, String)> {
        let Some(record) = self.instances.get(id) else {
            return Vec::new();
        };
        if !record.connected {
            return Vec::new();
        }
        let host = record.host;
        let members: Vec<(String, NodeId)> = record
            .targets
            .iter()
            .flat_map(|(target_type, elements)| elements.iter().map(move |&e| (target_type.clone(), e)))
            .collect();

        let mut locals = Vec::new();
        for (target_type, element) in members {
            let raws = self.connector.links_connected_to(element, id, &target_type);
            if raws.is_empty() {
                if let Some(set) = self.instances.get_mut(id).and_then(|r| r.targets.get_mut(&target_type)) {
                    set.retain(|&e| e != element);
                }
                continue;
            }
            for raw in raws {
                self.disconnect_link(element, &raw);
                if !self.orphan_link_if_remote(element, &raw) {
                    locals.push((element, raw));
                }
            }
        }

        let remote_actions = self
            .instances
            .get_mut(id)
            .map(|r| std::mem::take(&mut r.remote_actions))
            .unwrap_or_default();
        for (element, raw) in remote_actions {
            self.detach_binding(element, &raw);
            self.orphan_binding_if_remote(element, &raw);
        }

        self.call_hook(id, Hook::Disconnected);
        if let Some(record) = self.instances.get_mut(id) {
            record.connected = false;
        }
        tracing::debug!(element = %host, %id, "controller disconnected");
        locals
    }

    /// Connect instances for a token registered after [`connect`](Self::connect)
    ///
    /// Every host is connected and scoped before any of them claims
    /// targets, so nested hosts keep their own.
    pub(crate) fn connect_late_registration(&mut self, token: &str) {
        let hosts: Vec<NodeId> = self
            .document
            .descendant_elements(NodeId::ROOT)
            .into_iter()
            .filter(|&el| self.declared_host_tokens(el).iter().any(|t| t == token))
            .collect();
        let tokens = [token.to_string()];
        for &host in &hosts {
            self.host_tokens_added(host, &tokens, false);
        }
        for &host in &hosts {
            if self.document.is_connected(host) {
                self.rescan_targets(host, token);
            }
        }
    }

    /// Write ` a b ` into the scope attribute, or remove it when empty
    fn update_scope(&mut self, element: NodeId) {
        let tokens: Vec<String> = self.instances.on_host(element).into_iter().map(|(t, _)| t).collect();
        let attribute = self.config.scope_attribute.clone();
        let result = if tokens.is_empty() {
            self.document.remove_attribute(element, &attribute).map(|_| ())
        } else {
            let value = format!(" {} ", tokens.join(" "));
            if self.document.get_attribute(element, &attribute) == Some(value.as_str()) {
                return;
            }
            self.document.set_attribute(element, &attribute, &value)
        };
        if let Err(err) = result {
            tracing::debug!(%element, "scope update failed: {err}");
        }
    }

    fn observe_host(&mut self, element: NodeId) {
        if !self.connected {
            return;
        }
        let Some(observer) = self.connector.attribute_observer else {
            return;
        };
        if !self.document.is_observing(observer, element) {
            self.document.observe(
                observer,
                element,
                MutationObserverInit {
                    attributes: true,
                    attribute_old_value: true,
                    ..Default::default()
                },
            );
        }
    }

    pub(crate) fn unobserve_host(&mut self, element: NodeId) {
        if let Some(observer) = self.connector.attribute_observer {
            self.document.unobserve(observer, element);
        }
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    fn child_tokens_added(&mut self, element: NodeId, descriptors: &[String]) {
        for raw in descriptors {
            let Some(descriptor) = LinkDescriptor::parse(raw) else {
                self.report(Diagnostic::MalformedDescriptor {
                    attribute: self.config.target_attribute.clone(),
                    descriptor: raw.clone(),
                    element,
                });
                continue;
            };

            let owner = self.resolve_owner(element, &descriptor.token, descriptor.host_id.as_deref());
            let current = self.connector.link(element, raw).map(|link| link.state);
            if owner.is_some() && current == owner.map(LinkState::Connected) {
                continue;
            }

            // A stale connection for the same descriptor goes first
            self.disconnect_link(element, raw);
            self.connector.orphans.remove(element, OrphanKind::Target, raw);

            if !self.registry.contains(&descriptor.token) {
                self.report(Diagnostic::UnknownController {
                    token: descriptor.token.clone(),
                    element,
                });
            }
            let state = match (owner, &descriptor.host_id) {
                (None, Some(host_id)) => {
                    self.connector.orphans.add(
                        host_id,
                        Orphan {
                            element,
                            kind: OrphanKind::Target,
                            descriptor: raw.clone(),
                            token: descriptor.token.clone(),
                        },
                    );
                    LinkState::Orphaned
                }
                _ => LinkState::Unresolved,
            };
            keyed_insert(&mut self.connector.links, element, raw, ElementLink { descriptor, state });

            if let Some(id) = owner {
                self.connect_link(element, raw, id);
            }
        }
    }

    fn child_tokens_removed(&mut self, element: NodeId, descriptors: &[String]) {
        for raw in descriptors {
            self.remove_link(element, raw);
        }
    }

    fn connect_link(&mut self, element: NodeId, raw: &str, id: ControllerId) {
        let Some(link) = self.connector.link_mut(element, raw) else {
            return;
        };
        link.state = LinkState::Connected(id);
        let target_type = link.descriptor.target_type.clone();

        let Some(record) = self.instances.get_mut(id) else {
            return;
        };
        let declared = record.class.declares_target(&target_type);
        let token = record.token.clone();
        let members = record.targets.entry(target_type.clone()).or_default();
        if members.contains(&element) {
            return;
        }
        members.push(element);

        if !declared {
            self.report(Diagnostic::UndeclaredTarget {
                token,
                target_type: target_type.clone(),
                element,
            });
        }
        tracing::trace!(%element, %id, %target_type, "target connected");
        self.call_hook(id, Hook::TargetConnected { target_type, element });
    }

    /// Leave the target set; the link falls back to `Unresolved`
    fn disconnect_link(&mut self, element: NodeId, raw: &str) {
        let Some(link) = self.connector.link_mut(element, raw) else {
            return;
        };
        let LinkState::Connected(id) = link.state else {
            return;
        };
        link.state = LinkState::Unresolved;
        let target_type = link.descriptor.target_type.clone();

        let removed = self
            .instances
            .get_mut(id)
            .and_then(|record| record.targets.get_mut(&target_type))
            .is_some_and(|members| {
                let before = members.len();
                members.retain(|&e| e != element);
                members.len() != before
            });
        if removed {
            tracing::trace!(%element, %id, %target_type, "target disconnected");
            self.call_hook(id, Hook::TargetDisconnected { target_type, element });
        }
    }

    /// Re-register a remote link as an orphan; `false` for local links
    fn orphan_link_if_remote(&mut self, element: NodeId, raw: &str) -> bool {
        let connected = self.document.is_connected(element);
        let Some(link) = self.connector.link_mut(element, raw) else {
            return true;
        };
        let Some(host_id) = link.descriptor.host_id.clone() else {
            return false;
        };
        if connected {
            link.state = LinkState::Orphaned;
            let token = link.descriptor.token.clone();
            self.connector.orphans.add(
                &host_id,
                Orphan {
                    element,
                    kind: OrphanKind::Target,
                    descriptor: raw.to_string(),
                    token,
                },
            );
        }
        true
    }

    fn remove_link(&mut self, element: NodeId, raw: &str) {
        self.disconnect_link(element, raw);
        self.connector.orphans.remove(element, OrphanKind::Target, raw);
        keyed_remove(&mut self.connector.links, element, raw);
    }

    /// Reconnect local targets under `host` that belong to it for `token`
    fn rescan_targets(&mut self, host: NodeId, token: &str) {
        let Some(owner) = self.instances.find(host, token) else {
            return;
        };
        let scope = Selector::attribute_contains(&self.config.scope_attribute, &format!(" {token} "));

        for element in self.document.descendant_elements(host) {
            if self.document.closest(element, &scope) != Some(host) {
                continue;
            }
            for raw in self.declared_target_descriptors(element) {
                let Some(descriptor) = LinkDescriptor::parse(&raw) else {
                    continue;
                };
                if descriptor.token != token || descriptor.host_id.is_some() {
                    continue;
                }
                let current = self.connector.link(element, &raw).map(|l| l.state);
                if current == Some(LinkState::Connected(owner)) {
                    continue;
                }
                self.child_tokens_added(element, std::slice::from_ref(&raw));
            }
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn handler_el_added(&mut self, element: NodeId, descriptors: &[String]) {
        for raw in descriptors {
            if self.connector.binding(element, raw).is_some() {
                continue;
            }
            let Some(descriptor) = ActionDescriptor::parse(raw) else {
                self.report(Diagnostic::MalformedDescriptor {
                    attribute: self.config.action_attribute.clone(),
                    descriptor: raw.clone(),
                    element,
                });
                continue;
            };
            if !self.registry.contains(&descriptor.token) {
                self.report(Diagnostic::UnknownController {
                    token: descriptor.token.clone(),
                    element,
                });
            }

            let event_type = descriptor.event_type(&self.document, element);
            let token = descriptor.token.clone();
            let host_id = descriptor.host_id.clone();
            keyed_insert(
                &mut self.connector.bindings,
                element,
                raw,
                ActionBinding {
                    descriptor,
                    event_type,
                    state: BindingState::Detached,
                },
            );

            match host_id {
                None => self.attach_binding(element, raw, None),
                Some(host_id) => match self.resolve_owner(element, &token, Some(&host_id)) {
                    Some(id) => self.attach_binding(element, raw, Some(id)),
                    None => {
                        self.orphan_binding_if_remote(element, raw);
                    }
                },
            }
        }
    }

    fn handler_el_removed(&mut self, element: NodeId, descriptors: &[String]) {
        for raw in descriptors {
            self.remove_binding(element, raw);
        }
    }

    fn attach_binding(&mut self, element: NodeId, raw: &str, owner: Option<ControllerId>) {
        let handler = self.next_handler_id();
        let Some(binding) = self.connector.binding_mut(element, raw) else {
            return;
        };
        binding.state = BindingState::Attached { handler, owner };
        let event_type = binding.event_type.clone();
        let options = binding.descriptor.options.listener_options();

        self.handlers.insert(
            handler,
            Handler::Action {
                element,
                descriptor: raw.to_string(),
            },
        );
        self.document.add_event_listener(element, &event_type, handler, options);
        if let Some(record) = owner.and_then(|id| self.instances.get_mut(id)) {
            record.remote_actions.push((element, raw.to_string()));
        }
        tracing::trace!(%element, descriptor = raw, %event_type, "action attached");
    }

    fn detach_binding(&mut self, element: NodeId, raw: &str) {
        let Some(binding) = self.connector.binding_mut(element, raw) else {
            return;
        };
        let BindingState::Attached { handler, owner } = binding.state else {
            return;
        };
        binding.state = BindingState::Detached;
        let event_type = binding.event_type.clone();
        let capture = binding.descriptor.options.capture;

        self.document.remove_event_listener(element, &event_type, handler, capture);
        self.handlers.remove(&handler);
        if let Some(record) = owner.and_then(|id| self.instances.get_mut(id)) {
            record.remote_actions.retain(|(e, d)| !(*e == element && d == raw));
        }
    }

    fn orphan_binding_if_remote(&mut self, element: NodeId, raw: &str) {
        let connected = self.document.is_connected(element);
        let Some(binding) = self.connector.binding_mut(element, raw) else {
            return;
        };
        let Some(host_id) = binding.descriptor.host_id.clone() else {
            return;
        };
        if !connected {
            return;
        }
        binding.state = BindingState::Orphaned;
        let token = binding.descriptor.token.clone();
        self.connector.orphans.add(
            &host_id,
            Orphan {
                element,
                kind: OrphanKind::Action,
                descriptor: raw.to_string(),
                token,
            },
        );
    }

    fn remove_binding(&mut self, element: NodeId, raw: &str) {
        self.detach_binding(element, raw);
        self.connector.orphans.remove(element, OrphanKind::Action, raw);
        keyed_remove(&mut self.connector.bindings, element, raw);
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Connected instance owning a declaration for `token` on `element`
    ///
    /// A host id is looked up by id only; without one the nearest
    /// inclusive ancestor scoped for `token` owns it.
    pub(crate) fn resolve_owner(&self, element: NodeId, token: &str, host_id: Option<&str>) -> Option<ControllerId> {
        let host = match host_id {
            Some(host_id) => self.document.get_element_by_id(host_id)?,
            None => {
                let scope = Selector::attribute_contains(&self.config.scope_attribute, &format!(" {token} "));
                self.document.closest(element, &scope)?
            }
        };
        let id = self.instances.find(host, token)?;
        self.is_controller_connected(id).then_some(id)
    }

    /// Connect orphans waiting for `host`'s id that name `token`
    fn resolve_orphans(&mut self, host: NodeId, token: &str) {
        let Some(host_id) = self.document.get_attribute(host, ID_ATTRIBUTE).map(str::to_string) else {
            return;
        };
        let Some(owner) = self.instances.find(host, token) else {
            return;
        };
        if self.document.get_element_by_id(&host_id) != Some(host) {
            return;
        }

        for orphan in self.connector.orphans.take(&host_id, token) {
            if !self.document.is_connected(orphan.element) {
                continue;
            }
            tracing::trace!(element = %orphan.element, descriptor = %orphan.descriptor, "orphan resolved");
            match orphan.kind {
                OrphanKind::Target => {
                    if let Some(link) = self.connector.link_mut(orphan.element, &orphan.descriptor) {
                        link.state = LinkState::Unresolved;
                        self.connect_link(orphan.element, &orphan.descriptor, owner);
                    }
                }
                OrphanKind::Action => {
                    if self.connector.binding(orphan.element, &orphan.descriptor).is_some() {
                        self.attach_binding(orphan.element, &orphan.descriptor, Some(owner));
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Host tokens declared by `element` (attribute tokens plus custom element tag)
    fn declared_host_tokens(&self, element: NodeId) -> Vec<String> {
        let mut tokens: Vec<String> = split_tokens(self.document.get_attribute(element, &self.config.controller_attribute))
            .into_iter()
            .filter(|t| !t.contains('.'))
            .collect();
        match self.custom_element_token(element) {
            Some(token) if !tokens.contains(&token) => tokens.push(token),
            _ => {}
        }
        tokens
    }

    /// `<x-menu>` declares `menu` when the prefix is `x-` and `menu` is registered
    fn custom_element_token(&self, element: NodeId) -> Option<String> {
        let prefix = self.config.custom_element_prefix.as_deref()?;
        let token = self.document.tag_name(element)?.strip_prefix(prefix)?;
        self.registry.contains(token).then(|| token.to_string())
    }

    /// Declared tokens plus everything they inject
    fn required_tokens(&self, element: NodeId) -> Vec<String> {
        let mut required = self.declared_host_tokens(element);
        let mut i = 0;
        while i < required.len() {
            if let Some(class) = self.registry.get(&required[i]) {
                for (injected, _) in class.injects() {
                    if !required.contains(injected) {
                        required.push(injected.clone());
                    }
                }
            }
            i += 1;
        }
        required
    }

    fn declared_target_descriptors(&self, element: NodeId) -> Vec<String> {
        split_tokens(self.document.get_attribute(element, &self.config.target_attribute))
            .into_iter()
            .filter(|t| t.contains('.'))
            .collect()
    }

    fn declared_action_descriptors(&self, element: NodeId) -> Vec<String> {
        let mut descriptors: Vec<String> = Vec::new();
        for raw in split_descriptors(self.document.get_attribute(element, &self.config.action_attribute).unwrap_or("")) {
            if !descriptors.iter().any(|d| d == raw) {
                descriptors.push(raw.to_string());
            }
        }
        descriptors
    }
}
