//! Controller trait and lifecycle hooks

use std::any::Any;
use std::fmt;

use serde_json::Value;
use tether_dom::NodeId;

use crate::Context;
use crate::properties::PropertyChange;

/// Handle to a controller instance owned by an [`Application`](crate::Application)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub(crate) u32);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller#{}", self.0)
    }
}

/// Action parameters gathered from `data-<token>.<method>` attributes
pub type Params = serde_json::Map<String, Value>;

/// Downcasting support for boxed controllers
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour attached to a host element
///
/// Every hook has an empty default. Hooks receive a [`Context`] for the
/// instance; hooks triggered from inside a hook (for example a property
/// set in `connected`) run after the current one returns.
pub trait Controller: AsAny {
    /// Called once, right after construction and property initialization
    fn initialized(&mut self, _cx: &mut Context<'_>) {}

    /// Host entered the document (or regained this token)
    fn connected(&mut self, _cx: &mut Context<'_>) {}

    /// Host left the document (or lost this token)
    fn disconnected(&mut self, _cx: &mut Context<'_>) {}

    /// A host attribute that is not a declared property changed
    fn attribute_changed(&mut self, _cx: &mut Context<'_>, _name: &str, _old: Option<&str>, _new: Option<&str>) {}

    /// A declared property changed value
    fn property_changed(&mut self, _cx: &mut Context<'_>, _name: &str, _old: &Value, _new: &Value) {}

    /// An element joined the target set for `target_type`
    fn target_connected(&mut self, _cx: &mut Context<'_>, _target_type: &str, _element: NodeId) {}

    /// An element left the target set for `target_type`
    fn target_disconnected(&mut self, _cx: &mut Context<'_>, _target_type: &str, _element: NodeId) {}
}

/// Deferred hook call
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Hook {
    Initialized,
    Connected,
    Disconnected,
    AttributeChanged {
        name: String,
        old: Option<String>,
        new: Option<String>,
    },
    PropertyChanged {
        name: String,
        old: Value,
        new: Value,
    },
    TargetConnected {
        target_type: String,
        element: NodeId,
    },
    TargetDisconnected {
        target_type: String,
        element: NodeId,
    },
}

impl From<PropertyChange> for Hook {
    fn from(change: PropertyChange) -> Self {
        Self::PropertyChanged {
            name: change.name,
            old: change.old,
            new: change.new,
        }
    }
}

impl Hook {
    pub(crate) fn invoke(&self, controller: &mut dyn Controller, cx: &mut Context<'_>) {
        match self {
            Self::Initialized => controller.initialized(cx),
            Self::Connected => controller.connected(cx),
            Self::Disconnected => controller.disconnected(cx),
            Self::AttributeChanged { name, old, new } => {
                controller.attribute_changed(cx, name, old.as_deref(), new.as_deref())
            }
            Self::PropertyChanged { name, old, new } => controller.property_changed(cx, name, old, new),
            Self::TargetConnected { target_type, element } => controller.target_connected(cx, target_type, *element),
            Self::TargetDisconnected { target_type, element } => {
                controller.target_disconnected(cx, target_type, *element)
            }
        }
    }
}
