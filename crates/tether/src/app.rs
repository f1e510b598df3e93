//! Application
//!
//! Owns the document, the registry, every controller instance and the
//! connector's side tables. All public entry points live here; the
//! mutation protocol itself is in [`crate::connector`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_dom::{Document, Event, EventPhase, HandlerId, ListenerOptions, NodeId};

use crate::action::gather_params;
use crate::connector::ConnectorState;
use crate::context::{Context, PendingHook};
use crate::controller::Hook;
use crate::definition::{ActionFn, ControllerDefinition};
use crate::error::log_diagnostic;
use crate::instances::Instances;
use crate::naming::class_name_to_token;
use crate::registry::Registry;
use crate::{Config, Controller, ControllerId, Diagnostic, DiagnosticHook, Params, Result};

/// Native listener added through [`Application::add_event_listener`]
pub type NativeListener = Rc<dyn Fn(&mut Document, &mut Event)>;

/// What a registered [`HandlerId`] runs
pub(crate) enum Handler {
    /// Declarative binding, looked up again at dispatch time
    Action { element: NodeId, descriptor: String },
    Native(NativeListener),
}

/// Controller application bound to one document
pub struct Application {
    pub(crate) config: Config,
    pub(crate) document: Document,
    pub(crate) registry: Registry,
    pub(crate) instances: Instances,
    pub(crate) connector: ConnectorState,
    pub(crate) handlers: HashMap<HandlerId, Handler>,
    next_handler: u64,
    pending: VecDeque<PendingHook>,
    diagnostic_hook: Option<DiagnosticHook>,
    pub(crate) connected: bool,
}

impl Application {
    /// Application with the default configuration
    pub fn new(document: Document) -> Self {
        Self {
            config: Config::default(),
            document,
            registry: Registry::new(),
            instances: Instances::default(),
            connector: ConnectorState::default(),
            handlers: HashMap::new(),
            next_handler: 1,
            pending: VecDeque::new(),
            diagnostic_hook: None,
            connected: false,
        }
    }

    /// Application with a custom configuration
    pub fn with_config(document: Document, config: Config) -> Result<Self> {
        config.validate()?;
        let mut app = Self::new(document);
        app.config = config;
        Ok(app)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutations are picked up at the next [`flush`](Self::flush)
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a controller under `token`
    ///
    /// When the application is already connected, elements declaring the
    /// token are connected right away.
    pub fn register_controller(&mut self, token: &str, definition: impl Into<ControllerDefinition>) -> Result<()> {
        self.registry.register(&self.config, token, definition.into())?;
        if self.connected {
            self.connect_late_registration(token);
            self.flush();
        }
        Ok(())
    }

    /// Register several controllers keyed by class-style names
    /// (`DropdownMenuController` → `dropdown-menu`)
    pub fn register_controllers<'a, I>(&mut self, controllers: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (&'a str, ControllerDefinition)>,
    {
        let mut tokens = Vec::new();
        for (name, definition) in controllers {
            let token = class_name_to_token(name);
            self.register_controller(&token, definition)?;
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Run `callback` for every connected element matching `selector`, now
    /// (when connected) and whenever one is added
    pub fn register_selector_callback<F>(&mut self, selector: &str, callback: F) -> Result<()>
    where
        F: Fn(&mut Document, NodeId) + 'static,
    {
        let callback: Rc<dyn Fn(&mut Document, NodeId)> = Rc::new(callback);
        self.registry.add_selector_callback(selector, Rc::clone(&callback))?;
        if self.connected {
            let selector = tether_dom::Selector::parse(selector)?;
            for element in self.document.query_selector_all(NodeId::ROOT, &selector) {
                callback(&mut self.document, element);
            }
            self.flush();
        }
        Ok(())
    }

    /// Map form of [`register_selector_callback`](Self::register_selector_callback)
    pub fn register_selector_callbacks<'a, I, F>(&mut self, callbacks: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, F)>,
        F: Fn(&mut Document, NodeId) + 'static,
    {
        for (selector, callback) in callbacks {
            self.register_selector_callback(selector, callback)?;
        }
        Ok(())
    }

    /// Replace the default diagnostic logger
    pub fn set_diagnostic_hook(&mut self, hook: impl Fn(&Diagnostic) + 'static) {
        self.diagnostic_hook = Some(Box::new(hook));
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        match &self.diagnostic_hook {
            Some(hook) => hook(&diagnostic),
            None => log_diagnostic(&diagnostic),
        }
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Instance of `token` hosted by `element`, connected or dormant
    pub fn get_controller(&self, element: NodeId, token: &str) -> Option<ControllerId> {
        self.instances.find(element, token)
    }

    /// Instances hosted by `element`, in creation order
    pub fn controllers_on(&self, element: NodeId) -> Vec<ControllerId> {
        self.instances.on_host(element).into_iter().map(|(_, id)| id).collect()
    }

    pub fn connected_controllers(&self) -> Vec<ControllerId> {
        self.instances.connected_ids()
    }

    pub fn is_controller_connected(&self, id: ControllerId) -> bool {
        self.instances.get(id).is_some_and(|r| r.connected)
    }

    pub fn host_of(&self, id: ControllerId) -> Option<NodeId> {
        self.instances.get(id).map(|r| r.host)
    }

    pub fn token_of(&self, id: ControllerId) -> Option<&str> {
        self.instances.get(id).map(|r| r.token.as_str())
    }

    /// Typed view of an instance
    pub fn controller<T: Controller>(&self, id: ControllerId) -> Option<&T> {
        let behavior: &dyn Controller = self.instances.get(id)?.behavior.as_deref()?;
        behavior.as_any().downcast_ref::<T>()
    }

    pub fn controller_mut<T: Controller>(&mut self, id: ControllerId) -> Option<&mut T> {
        let behavior: &mut dyn Controller = self.instances.get_mut(id)?.behavior.as_deref_mut()?;
        behavior.as_any_mut().downcast_mut::<T>()
    }

    pub fn property(&self, id: ControllerId, name: &str) -> Option<&Value> {
        self.instances.get(id)?.property(name)
    }

    /// Property deserialized into `T`
    pub fn property_as<T: DeserializeOwned>(&self, id: ControllerId, name: &str) -> Option<T> {
        self.property(id, name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Assign a declared property, syncing its attribute; `false` when not declared
    pub fn set_property(&mut self, id: ControllerId, name: &str, value: impl Into<Value>) -> bool {
        let declared = self
            .instances
            .get(id)
            .is_some_and(|r| r.class.syncer().is_declared(name));
        if !declared {
            return false;
        }
        if let Some(change) = self
            .instances
            .set_property(&mut self.document, id, name, value.into(), true)
        {
            self.call_hook(id, change.into());
        }
        true
    }

    /// Connected targets of `target_type`, in connection order
    pub fn targets(&self, id: ControllerId, target_type: &str) -> &[NodeId] {
        self.instances.get(id).map(|r| r.targets(target_type)).unwrap_or(&[])
    }

    pub fn target(&self, id: ControllerId, target_type: &str) -> Option<NodeId> {
        self.targets(id, target_type).first().copied()
    }

    /// Instance of `token` on the same host as `id`
    pub fn injected(&self, id: ControllerId, token: &str) -> Option<ControllerId> {
        let host = self.instances.get(id)?.host;
        self.instances.find(host, token)
    }

    /// Drop the dormant instances of a detached element and its subtree
    ///
    /// Returns how many instances were released. Connected elements are
    /// left alone.
    pub fn release(&mut self, element: NodeId) -> usize {
        self.flush();
        if self.document.is_connected(element) {
            return 0;
        }
        let mut released = 0;
        for host in self.document.descendant_elements(element) {
            self.teardown_element(host);
            for (_, id) in self.instances.on_host(host).into_iter().rev() {
                self.disconnect_instance(id);
                self.instances.remove(id);
                released += 1;
            }
            self.unobserve_host(host);
        }
        tracing::debug!(%element, released, "released detached controllers");
        released
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Add a native listener
    pub fn add_event_listener<F>(&mut self, element: NodeId, event_type: &str, options: ListenerOptions, listener: F) -> HandlerId
    where
        F: Fn(&mut Document, &mut Event) + 'static,
    {
        let handler = self.next_handler_id();
        self.handlers.insert(handler, Handler::Native(Rc::new(listener)));
        self.document.add_event_listener(element, event_type, handler, options);
        handler
    }

    pub fn remove_event_listener(&mut self, element: NodeId, event_type: &str, handler: HandlerId, capture: bool) {
        self.document.remove_event_listener(element, event_type, handler, capture);
        self.handlers.remove(&handler);
    }

    /// Dispatch `event` at `target` through capture, target and bubble phases
    ///
    /// Pending mutations are flushed before dispatch and after every
    /// listener. Returns `false` when the default was prevented.
    pub fn dispatch_event(&mut self, target: NodeId, mut event: Event) -> bool {
        self.flush();
        event.target = target;
        let path = self.document.event_path(target);
        let Some((&at_target, ancestors)) = path.split_last() else {
            return true;
        };

        event.phase = EventPhase::Capturing;
        for &node in ancestors {
            self.invoke_listeners(node, &mut event, true);
            if event.is_propagation_stopped() {
                break;
            }
        }

        if !event.is_propagation_stopped() {
            event.phase = EventPhase::AtTarget;
            self.invoke_listeners(at_target, &mut event, true);
            if !event.is_immediate_propagation_stopped() {
                self.invoke_listeners(at_target, &mut event, false);
            }
        }

        if event.bubbles && !event.is_propagation_stopped() {
            event.phase = EventPhase::Bubbling;
            for &node in ancestors.iter().rev() {
                self.invoke_listeners(node, &mut event, false);
                if event.is_propagation_stopped() {
                    break;
                }
            }
        }

        event.phase = EventPhase::None;
        event.current_target = NodeId::NONE;
        !event.is_default_prevented()
    }

    fn invoke_listeners(&mut self, node: NodeId, event: &mut Event, capture: bool) {
        event.current_target = node;
        let event_type = event.event_type.clone();
        let listeners = self.document.listeners(node, &event_type);

        for listener in listeners.into_iter().filter(|l| l.options.capture == capture) {
            if event.is_immediate_propagation_stopped() {
                break;
            }
            // An earlier listener may have removed this one
            if !self.document.listeners(node, &event_type).contains(&listener) {
                continue;
            }
            if listener.options.once {
                self.document
                    .remove_event_listener(node, &event_type, listener.handler_id, capture);
            }

            event.set_in_passive_listener(listener.options.passive);
            self.run_handler(listener.handler_id, event);
            event.set_in_passive_listener(false);

            if listener.options.once {
                self.drop_once_handler(listener.handler_id);
            }
            self.flush();
        }
    }

    fn run_handler(&mut self, handler: HandlerId, event: &mut Event) {
        match self.handlers.get(&handler) {
            Some(Handler::Native(listener)) => {
                let listener = Rc::clone(listener);
                listener(&mut self.document, event);
            }
            Some(Handler::Action { element, descriptor }) => {
                let (element, descriptor) = (*element, descriptor.clone());
                self.dispatch_action(element, &descriptor, event);
            }
            None => tracing::trace!(?handler, "listener without handler"),
        }
    }

    /// Native handlers registered with `once` are dropped after firing;
    /// action handlers stay until their binding is torn down
    fn drop_once_handler(&mut self, handler: HandlerId) {
        if matches!(self.handlers.get(&handler), Some(Handler::Native(_))) {
            self.handlers.remove(&handler);
        }
    }

    fn dispatch_action(&mut self, element: NodeId, raw: &str, event: &mut Event) {
        let Some(descriptor) = self.connector.binding(element, raw).map(|b| b.descriptor.clone()) else {
            return;
        };
        if descriptor.key_filter.as_ref().is_some_and(|filter| !filter.matches(event)) {
            return;
        }

        let Some(id) = self.resolve_owner(element, &descriptor.token, descriptor.host_id.as_deref()) else {
            self.report(Diagnostic::UnresolvedAction {
                descriptor: raw.to_string(),
                element,
            });
            return;
        };
        let Some(action) = self
            .instances
            .get(id)
            .and_then(|r| r.class.action(&descriptor.method))
        else {
            self.report(Diagnostic::MissingAction {
                token: descriptor.token.clone(),
                method: descriptor.method.clone(),
                element,
            });
            return;
        };

        if descriptor.options.prevent {
            event.prevent_default();
        }
        if descriptor.options.stop {
            event.stop_propagation();
        }
        let params = gather_params(&self.document, element, &self.config, &descriptor.token, &descriptor.method);
        tracing::trace!(token = %descriptor.token, method = %descriptor.method, %element, "invoking action");
        self.run_action(id, &action, &params, event);
    }

    pub(crate) fn next_handler_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        id
    }

    // ------------------------------------------------------------------
    // Hook invocation
    // ------------------------------------------------------------------

    /// Run a hook, then whatever it queued
    pub(crate) fn call_hook(&mut self, id: ControllerId, hook: Hook) {
        self.run_hook(id, hook);
        self.drain_pending();
    }

    fn run_hook(&mut self, id: ControllerId, hook: Hook) {
        let Some(mut behavior) = self.instances.get_mut(id).and_then(|r| r.behavior.take()) else {
            tracing::trace!(%id, ?hook, "dropping hook for unavailable controller");
            return;
        };
        {
            let mut cx = self.context(id);
            hook.invoke(behavior.as_mut(), &mut cx);
        }
        if let Some(record) = self.instances.get_mut(id) {
            record.behavior = Some(behavior);
        }
    }

    fn run_action(&mut self, id: ControllerId, action: &ActionFn, params: &Params, event: &mut Event) {
        let Some(mut behavior) = self.instances.get_mut(id).and_then(|r| r.behavior.take()) else {
            return;
        };
        {
            let mut cx = self.context(id);
            action(behavior.as_mut(), &mut cx, params, event);
        }
        if let Some(record) = self.instances.get_mut(id) {
            record.behavior = Some(behavior);
        }
        self.drain_pending();
    }

    fn drain_pending(&mut self) {
        while let Some(PendingHook { id, hook }) = self.pending.pop_front() {
            self.run_hook(id, hook);
        }
    }

    fn context(&mut self, id: ControllerId) -> Context<'_> {
        Context {
            document: &mut self.document,
            instances: &mut self.instances,
            pending: &mut self.pending,
            id,
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("connected", &self.connected)
            .field("controllers", &self.instances.connected_ids().len())
            .finish_non_exhaustive()
    }
}
