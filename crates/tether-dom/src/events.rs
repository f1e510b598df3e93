//! DOM Events
//!
//! Event objects and listener bookkeeping. Listeners only carry a
//! [`HandlerId`]; the embedder owns the code behind it and drives the
//! capture → target → bubble walk using [`Document::event_path`].
//!
//! [`Document::event_path`]: crate::Document::event_path

use std::collections::HashMap;

use crate::NodeId;

/// Event handler ID, resolved by the embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Listener options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

/// Registered event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventListener {
    pub handler_id: HandlerId,
    pub options: ListenerOptions,
}

/// Dispatch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventPhase {
    #[default]
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// Modifier keys held during a keyboard or pointer event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

/// DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
    pub current_target: NodeId,
    pub phase: EventPhase,
    pub bubbles: bool,
    pub cancelable: bool,
    /// `KeyboardEvent.key`
    pub key: Option<String>,
    pub modifiers: Modifiers,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
    in_passive_listener: bool,
}

impl Event {
    /// Bubbling, cancelable event
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            target: NodeId::NONE,
            current_target: NodeId::NONE,
            phase: EventPhase::None,
            bubbles: true,
            cancelable: true,
            key: None,
            modifiers: Modifiers::default(),
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            in_passive_listener: false,
        }
    }

    /// Keyboard event carrying `key`
    pub fn keyboard(event_type: &str, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(event_type)
        }
    }

    /// Same event with the given modifiers held
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Same event, not bubbling
    pub fn non_bubbling(mut self) -> Self {
        self.bubbles = false;
        self
    }

    /// Same event, not cancelable
    pub fn non_cancelable(mut self) -> Self {
        self.cancelable = false;
        self
    }

    /// Prevent default action (ignored inside passive listeners)
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    /// Stop propagation after the current node's listeners
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Stop propagation and skip the remaining listeners on this node
    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    /// Check if default was prevented
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn is_immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped
    }

    /// Mark whether the listener being run is passive
    pub fn set_in_passive_listener(&mut self, passive: bool) {
        self.in_passive_listener = passive;
    }
}

/// Listeners by (node, event type)
#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    listeners: HashMap<(NodeId, String), Vec<EventListener>>,
}

impl ListenerRegistry {
    /// Add a listener; a second registration with the same handler and
    /// capture flag is ignored
    pub fn add(&mut self, node: NodeId, event_type: &str, listener: EventListener) -> bool {
        let list = self.listeners.entry((node, event_type.to_string())).or_default();
        if list
            .iter()
            .any(|l| l.handler_id == listener.handler_id && l.options.capture == listener.options.capture)
        {
            return false;
        }
        list.push(listener);
        true
    }

    pub fn remove(&mut self, node: NodeId, event_type: &str, handler_id: HandlerId, capture: bool) -> bool {
        let key = (node, event_type.to_string());
        let Some(list) = self.listeners.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| !(l.handler_id == handler_id && l.options.capture == capture));
        let removed = list.len() < before;
        if list.is_empty() {
            self.listeners.remove(&key);
        }
        removed
    }

    pub fn get(&self, node: NodeId, event_type: &str) -> Vec<EventListener> {
        self.listeners
            .get(&(node, event_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}
