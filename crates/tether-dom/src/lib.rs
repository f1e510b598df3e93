//! Tether DOM - headless Document Object Model
//!
//! Arena-based DOM tree with the pieces a behaviour layer needs from a
//! browser: attributes, mutation observers with microtask-style record
//! queues, event listeners and simple selector matching.

mod document;
mod error;
mod events;
mod mutation;
mod node;
mod selector;
mod tree;

pub use document::Document;
pub use error::{DomError, DomResult};
pub use events::{Event, EventListener, EventPhase, HandlerId, ListenerOptions, Modifiers};
pub use mutation::{MutationObserverInit, MutationRecord, MutationType, ObserverId};
pub use node::{Attribute, ElementData, Node, NodeData, TextData};
pub use selector::{AttrOperator, Selector, SelectorError, SimpleSelector};
pub use tree::DomTree;

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Document node ID
    pub const ROOT: NodeId = NodeId(0);

    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Whether this ID points at a node
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn option(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
