//! Controller registry
//!
//! Maps tokens to controller classes and keeps the selector callbacks run
//! for every connected element.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tether_dom::{Document, NodeId, Selector};

use crate::definition::{ControllerClass, ControllerDefinition};
use crate::naming::is_valid_token;
use crate::{Config, Error, Result};

/// Callback run for each connected element matching a selector
pub type SelectorCallback = Rc<dyn Fn(&mut Document, NodeId)>;

/// Registered controllers and selector callbacks
#[derive(Default)]
pub struct Registry {
    classes: HashMap<String, Rc<ControllerClass>>,
    selector_callbacks: Vec<(Selector, SelectorCallback)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller under `token`
    pub fn register(&mut self, config: &Config, token: &str, definition: ControllerDefinition) -> Result<()> {
        if !is_valid_token(token) {
            return Err(Error::InvalidToken(token.to_string()));
        }
        if self.classes.contains_key(token) {
            return Err(Error::AlreadyRegistered(token.to_string()));
        }
        for (injected, _) in &definition.injects {
            if !is_valid_token(injected) {
                return Err(Error::InvalidToken(injected.clone()));
            }
        }
        if let Some(cycle) = self.find_cycle(token, &definition) {
            return Err(Error::InjectionCycle(cycle));
        }

        tracing::debug!(token, "registered controller");
        self.classes
            .insert(token.to_string(), Rc::new(ControllerClass::new(config, token, definition)));
        Ok(())
    }

    pub fn get(&self, token: &str) -> Option<Rc<ControllerClass>> {
        self.classes.get(token).cloned()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.classes.contains_key(token)
    }

    /// Registered tokens, sorted
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        tokens.sort_unstable();
        tokens
    }

    pub fn add_selector_callback(&mut self, selector: &str, callback: SelectorCallback) -> Result<()> {
        let selector = Selector::parse(selector)?;
        self.selector_callbacks.push((selector, callback));
        Ok(())
    }

    pub fn selector_callbacks(&self) -> &[(Selector, SelectorCallback)] {
        &self.selector_callbacks
    }

    /// Injection path from `token` back to itself, if registering would close a loop
    fn find_cycle(&self, token: &str, definition: &ControllerDefinition) -> Option<Vec<String>> {
        let mut path = vec![token.to_string()];
        for (injected, _) in &definition.injects {
            if self.reaches(injected, token, &mut path) {
                return Some(path);
            }
        }
        None
    }

    fn reaches(&self, current: &str, goal: &str, path: &mut Vec<String>) -> bool {
        path.push(current.to_string());
        if current == goal {
            return true;
        }
        // Registered classes never contain a cycle, so the walk terminates
        if let Some(class) = self.classes.get(current) {
            for (next, _) in class.injects() {
                if self.reaches(next, goal, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tokens", &self.tokens())
            .field("selector_callbacks", &self.selector_callbacks.len())
            .finish()
    }
}
