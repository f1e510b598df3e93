//! Controller definitions
//!
//! A [`Definition`] describes a controller type: how to construct it, its
//! declared properties, target types, injections and actions. Definitions
//! are type-erased into [`ControllerDefinition`] so differently typed
//! controllers can be registered together.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tether_dom::Event;

use crate::properties::PropertySyncer;
use crate::{Config, Context, Controller, Params};

/// Type-erased action method
pub type ActionFn = Rc<dyn Fn(&mut dyn Controller, &mut Context<'_>, &Params, &mut Event)>;

type Factory = Rc<dyn Fn() -> Box<dyn Controller>>;

/// Typed controller definition builder
pub struct Definition<T> {
    factory: Rc<dyn Fn() -> T>,
    properties: Vec<(String, Value)>,
    targets: Vec<String>,
    injects: Vec<(String, Params)>,
    actions: HashMap<String, ActionFn>,
}

impl<T: Controller> Definition<T> {
    /// Definition whose instances are built by `factory`
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self {
            factory: Rc::new(factory),
            properties: Vec::new(),
            targets: Vec::new(),
            injects: Vec::new(),
            actions: HashMap::new(),
        }
    }

    /// Declare a synced property; the default's JSON kind picks its encoding
    pub fn property(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.properties.push((name.to_string(), default.into()));
        self
    }

    /// Declare a target type
    pub fn target(mut self, target_type: &str) -> Self {
        if !self.targets.iter().any(|t| t == target_type) {
            self.targets.push(target_type.to_string());
        }
        self
    }

    /// Co-instantiate `token` on the same host, before this controller
    pub fn inject(self, token: &str) -> Self {
        self.inject_with(token, Params::new())
    }

    /// Like [`inject`](Self::inject), with property overrides for the injected instance
    pub fn inject_with(mut self, token: &str, overrides: Params) -> Self {
        self.injects.push((token.to_string(), overrides));
        self
    }

    /// Register an action method callable from `data-handler` descriptors
    pub fn action<F>(mut self, name: &str, action: F) -> Self
    where
        F: Fn(&mut T, &mut Context<'_>, &Params, &mut Event) + 'static,
    {
        let erased: ActionFn = Rc::new(move |controller: &mut dyn Controller, cx: &mut Context<'_>, params: &Params, event: &mut Event| {
            if let Some(controller) = controller.as_any_mut().downcast_mut::<T>() {
                action(controller, cx, params, event);
            }
        });
        self.actions.insert(name.to_string(), erased);
        self
    }
}

impl<T: Controller + Default> Default for Definition<T> {
    fn default() -> Self {
        Self::new(T::default)
    }
}

/// Type-erased controller definition
#[derive(Clone)]
pub struct ControllerDefinition {
    factory: Factory,
    pub(crate) properties: Vec<(String, Value)>,
    pub(crate) targets: Vec<String>,
    pub(crate) injects: Vec<(String, Params)>,
    pub(crate) actions: HashMap<String, ActionFn>,
}

impl<T: Controller> From<Definition<T>> for ControllerDefinition {
    fn from(definition: Definition<T>) -> Self {
        let typed = definition.factory;
        Self {
            factory: Rc::new(move || Box::new(typed()) as Box<dyn Controller>),
            properties: definition.properties,
            targets: definition.targets,
            injects: definition.injects,
            actions: definition.actions,
        }
    }
}

impl fmt::Debug for ControllerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDefinition")
            .field("properties", &self.properties)
            .field("targets", &self.targets)
            .field("injects", &self.injects)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Registered controller class
pub struct ControllerClass {
    token: String,
    definition: ControllerDefinition,
    syncer: PropertySyncer,
}

impl ControllerClass {
    pub(crate) fn new(config: &Config, token: &str, definition: ControllerDefinition) -> Self {
        let syncer = PropertySyncer::new(config, token, &definition.properties);
        Self {
            token: token.to_string(),
            definition,
            syncer,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn syncer(&self) -> &PropertySyncer {
        &self.syncer
    }

    pub fn targets(&self) -> &[String] {
        &self.definition.targets
    }

    pub fn declares_target(&self, target_type: &str) -> bool {
        self.definition.targets.iter().any(|t| t == target_type)
    }

    /// Tokens injected into the same host, with their property overrides
    pub fn injects(&self) -> &[(String, Params)] {
        &self.definition.injects
    }

    pub fn action(&self, method: &str) -> Option<ActionFn> {
        self.definition.actions.get(method).cloned()
    }

    pub(crate) fn create(&self) -> Box<dyn Controller> {
        (self.definition.factory)()
    }
}

impl fmt::Debug for ControllerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerClass")
            .field("token", &self.token)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
