//! Property sync
//!
//! Each controller class owns a [`PropertySyncer`] built from its declared
//! properties. Instances keep their values in a [`PropertyStore`]; the
//! syncer keeps the store and the host's `data-<token>.<name>` attributes
//! in agreement. A value equal to the default is represented by the
//! attribute being absent.

use std::collections::HashMap;

use serde_json::Value;
use tether_dom::{Document, NodeId};

use crate::codec;
use crate::naming::{to_camel_case, to_kebab_case};
use crate::{Config, Params};

/// Declared property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    /// camelCase name used in code
    pub name: String,
    /// Host attribute mirroring the value
    pub attribute: String,
    pub default: Value,
}

/// Current property values of one instance, one slot per declared property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyStore {
    values: Vec<Value>,
}

/// Applied property change
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// What a host attribute mutation means for one instance
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeOutcome {
    /// The bulk attribute was set: re-read it
    Reinit,
    /// A property attribute changed: assign without writing back
    Set { name: String, value: Value },
    /// Not ours: forward to `attribute_changed`
    PassThrough,
    /// Bulk attribute removal (the sync consumed it)
    Ignore,
}

/// Keeps property values and host attributes in agreement
#[derive(Debug, Clone)]
pub struct PropertySyncer {
    bulk_attribute: String,
    specs: Vec<PropertySpec>,
    by_name: HashMap<String, usize>,
    by_attribute: HashMap<String, usize>,
}

impl PropertySyncer {
    /// Build the syncer for `token` from `(name, default)` declarations
    pub fn new(config: &Config, token: &str, properties: &[(String, Value)]) -> Self {
        let mut syncer = Self {
            bulk_attribute: format!("{}{token}", config.attribute_prefix),
            specs: Vec::with_capacity(properties.len()),
            by_name: HashMap::new(),
            by_attribute: HashMap::new(),
        };
        for (name, default) in properties {
            let name = to_camel_case(name);
            if syncer.by_name.contains_key(&name) {
                continue;
            }
            let attribute = config.scoped_attribute(token, &to_kebab_case(&name));
            syncer.by_name.insert(name.clone(), syncer.specs.len());
            syncer.by_attribute.insert(attribute.clone(), syncer.specs.len());
            syncer.specs.push(PropertySpec {
                name,
                attribute,
                default: default.clone(),
            });
        }
        syncer
    }

    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }

    /// `data-<token>`: JSON object of property values consumed on read
    pub fn bulk_attribute(&self) -> &str {
        &self.bulk_attribute
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get<'a>(&self, store: &'a PropertyStore, name: &str) -> Option<&'a Value> {
        self.by_name.get(name).and_then(|&i| store.values.get(i))
    }

    /// Initial values for a new instance on `element`
    ///
    /// First match wins per property: its own attribute, the bulk
    /// attribute, injection overrides, the default. Values taken from the
    /// bulk attribute or overrides are written back; the bulk attribute is
    /// consumed.
    pub fn init(&self, document: &mut Document, element: NodeId, overrides: Option<&Params>) -> PropertyStore {
        let bulk = self.read_bulk(document, element);
        let mut values = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            if let Some(raw) = document.get_attribute(element, &spec.attribute) {
                values.push(codec::decode(&spec.default, raw));
                continue;
            }
            let provided = bulk
                .get(&spec.name)
                .or_else(|| overrides.and_then(|o| o.get(&spec.name)));
            match provided {
                Some(value) => {
                    write_value(document, element, spec, value);
                    values.push(value.clone());
                }
                None => values.push(spec.default.clone()),
            }
        }

        if document.has_attribute(element, &self.bulk_attribute) {
            remove_attribute(document, element, &self.bulk_attribute);
        }
        PropertyStore { values }
    }

    /// Assign a property; `sync` writes the attribute side too
    ///
    /// Returns the change when the value actually differs. Undeclared
    /// names are ignored.
    pub fn set(
        &self,
        document: &mut Document,
        element: NodeId,
        store: &mut PropertyStore,
        name: &str,
        value: Value,
        sync: bool,
    ) -> Option<PropertyChange> {
        let &i = self.by_name.get(name)?;
        let spec = &self.specs[i];
        if store.values[i] == value {
            return None;
        }
        if sync {
            write_value(document, element, spec, &value);
        }
        let old = std::mem::replace(&mut store.values[i], value.clone());
        Some(PropertyChange {
            name: spec.name.clone(),
            old,
            new: value,
        })
    }

    /// Interpret a mutation of `attribute` whose current value is `new`
    pub fn on_attribute_mutated(&self, attribute: &str, new: Option<&str>) -> AttributeOutcome {
        if attribute == self.bulk_attribute {
            return match new {
                Some(_) => AttributeOutcome::Reinit,
                None => AttributeOutcome::Ignore,
            };
        }
        match self.by_attribute.get(attribute) {
            Some(&i) => {
                let spec = &self.specs[i];
                let value = match new {
                    Some(raw) => codec::decode(&spec.default, raw),
                    None => spec.default.clone(),
                };
                AttributeOutcome::Set {
                    name: spec.name.clone(),
                    value,
                }
            }
            None => AttributeOutcome::PassThrough,
        }
    }

    /// Re-run initialization on an existing instance and consume the bulk
    /// attribute
    ///
    /// Same precedence as [`init`](Self::init): a property's own attribute
    /// beats its bulk key. Properties missing from both keep their value.
    pub fn reinit(&self, document: &mut Document, element: NodeId, store: &mut PropertyStore) -> Vec<PropertyChange> {
        let bulk = self.read_bulk(document, element);
        remove_attribute(document, element, &self.bulk_attribute);

        let mut changes = Vec::new();
        for spec in &self.specs {
            let (value, sync) = match document.get_attribute(element, &spec.attribute) {
                Some(raw) => (codec::decode(&spec.default, raw), false),
                None => match bulk.get(&spec.name) {
                    Some(value) => (value.clone(), true),
                    None => continue,
                },
            };
            changes.extend(self.set(document, element, store, &spec.name, value, sync));
        }
        changes
    }

    fn read_bulk(&self, document: &Document, element: NodeId) -> Params {
        let Some(raw) = document.get_attribute(element, &self.bulk_attribute) else {
            return Params::new();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::debug!(attribute = %self.bulk_attribute, %element, "ignoring non-object bulk properties");
                Params::new()
            }
        }
    }
}

fn write_value(document: &mut Document, element: NodeId, spec: &PropertySpec, value: &Value) {
    if codec::is_default(&spec.default, value) {
        if document.has_attribute(element, &spec.attribute) {
            remove_attribute(document, element, &spec.attribute);
        }
        return;
    }
    let encoded = codec::encode(&spec.default, value);
    if document.get_attribute(element, &spec.attribute) == Some(encoded.as_str()) {
        return;
    }
    if let Err(err) = document.set_attribute(element, &spec.attribute, &encoded) {
        tracing::debug!(attribute = %spec.attribute, %element, "property write failed: {err}");
    }
}

fn remove_attribute(document: &mut Document, element: NodeId, name: &str) {
    if let Err(err) = document.remove_attribute(element, name) {
        tracing::debug!(attribute = %name, %element, "attribute removal failed: {err}");
    }
}
