//! Tether - declarative controllers for DOM elements
//!
//! Elements opt into behaviour through attributes:
//!
//! - `data-connect="menu"` makes the element a host of a `menu` controller
//! - `data-connect="menu.item"` makes it a target of the nearest `menu` host
//! - `data-handler="click->menu.open"` routes an event to a controller action
//!
//! An [`Application`] owns a [`tether_dom::Document`], watches it with
//! mutation observers and keeps instances, targets and actions in sync as
//! the tree changes. Mutations are applied in [`Application::flush`], which
//! also runs before and during event dispatch.
//!
//! ```ignore
//! let mut app = Application::new(document);
//! app.register_controller("counter", Definition::<Counter>::default().property("count", 0))?;
//! app.connect();
//! ```

mod app;
mod connector;
mod context;
mod controller;
mod definition;
mod error;
mod instances;
mod registry;

pub mod action;
pub mod codec;
pub mod config;
pub mod link;
pub mod naming;
pub mod properties;

pub use action::{ActionDescriptor, ActionOptions, KeyFilter, ModifierKey};
pub use app::{Application, NativeListener};
pub use config::Config;
pub use context::Context;
pub use controller::{AsAny, Controller, ControllerId, Params};
pub use definition::{ActionFn, ControllerClass, ControllerDefinition, Definition};
pub use error::{Diagnostic, DiagnosticHook, Error, Result};
pub use link::LinkDescriptor;
pub use properties::{AttributeOutcome, PropertyChange, PropertySpec, PropertyStore, PropertySyncer};
pub use registry::{Registry, SelectorCallback};

pub use tether_dom;
