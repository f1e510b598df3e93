//! Action descriptors
//!
//! `data-handler` values bind events to controller methods:
//!
//! ```text
//! [event[.modifier+key | .key]][[options]]-><token>.<method>[#hostId]
//! ```
//!
//! `click->menu.toggle`, `keydown.ctrl+s[prevent]->editor.save`,
//! `menu.close#main-menu` (event inferred from the tag).

use serde_json::Value;
use tether_dom::{Document, Event, ListenerOptions, NodeId};

use crate::codec::decode_untyped;
use crate::naming::{is_valid_token, to_camel_case, to_kebab_case};
use crate::{Config, Params};

/// Flags from the `[...]` block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    pub once: bool,
    pub passive: bool,
    pub capture: bool,
    /// Call `prevent_default` before the method runs
    pub prevent: bool,
    /// Call `stop_propagation` before the method runs
    pub stop: bool,
}

impl ActionOptions {
    fn parse(block: &str) -> Option<Self> {
        let mut options = Self::default();
        for flag in block.split_whitespace() {
            let (name, value) = match flag.strip_prefix('!') {
                Some(name) => (name, false),
                None => (flag, true),
            };
            match name {
                "once" => options.once = value,
                "passive" => options.passive = value,
                "capture" => options.capture = value,
                "prevent" => options.prevent = value,
                "stop" => options.stop = value,
                _ => return None,
            }
        }
        Some(options)
    }

    /// The native part of the options
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            capture: self.capture,
            passive: self.passive,
            once: self.once,
        }
    }
}

/// Modifier named in a keyboard filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKey {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl ModifierKey {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Self::Ctrl),
            "shift" => Some(Self::Shift),
            "alt" => Some(Self::Alt),
            "meta" | "cmd" => Some(Self::Meta),
            _ => None,
        }
    }
}

/// `keydown.enter`, `keydown.ctrl+s`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    pub key: String,
    pub modifier: Option<ModifierKey>,
}

impl KeyFilter {
    fn parse(filter: &str) -> Option<Self> {
        let (modifier, key) = match filter.split_once('+') {
            Some((modifier, key)) => (Some(ModifierKey::parse(modifier)?), key),
            None => (None, filter),
        };
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            modifier,
        })
    }

    /// Whether a keyboard event passes the filter
    pub fn matches(&self, event: &Event) -> bool {
        let Some(key) = event.key.as_deref() else {
            return false;
        };
        let wanted = match self.key.to_ascii_lowercase().as_str() {
            "space" => " ".to_string(),
            "esc" => "escape".to_string(),
            other => other.to_string(),
        };
        if !key.eq_ignore_ascii_case(&wanted) {
            return false;
        }
        match self.modifier {
            None => true,
            Some(ModifierKey::Ctrl) => event.modifiers.ctrl,
            Some(ModifierKey::Shift) => event.modifiers.shift,
            Some(ModifierKey::Alt) => event.modifiers.alt,
            Some(ModifierKey::Meta) => event.modifiers.meta,
        }
    }
}

/// Parsed action descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Explicit event name; `None` means infer from the element
    pub event: Option<String>,
    pub key_filter: Option<KeyFilter>,
    pub options: ActionOptions,
    pub token: String,
    pub method: String,
    /// Remote host (`#id`)
    pub host_id: Option<String>,
}

impl ActionDescriptor {
    /// Parse one descriptor, `None` when malformed
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (head, call) = match raw.split_once("->") {
            Some((head, call)) => (Some(head), call),
            None => (None, raw),
        };

        let mut event = None;
        let mut key_filter = None;
        let mut options = ActionOptions::default();
        if let Some(head) = head {
            let (event_part, block) = match head.find('[') {
                Some(open) => {
                    let block = head[open + 1..].strip_suffix(']')?;
                    (&head[..open], Some(block))
                }
                None => (head, None),
            };
            if let Some(block) = block {
                options = ActionOptions::parse(block)?;
            }
            if !event_part.is_empty() {
                let (name, filter) = match event_part.split_once('.') {
                    Some((name, filter)) => (name, Some(filter)),
                    None => (event_part, None),
                };
                if name.is_empty() || name.chars().any(char::is_whitespace) {
                    return None;
                }
                if let Some(filter) = filter {
                    let parsed = KeyFilter::parse(filter)?;
                    // Filters only mean something for keyboard events
                    if name.starts_with("keydown") || name.starts_with("keyup") {
                        key_filter = Some(parsed);
                    }
                }
                event = Some(name.to_string());
            }
        }

        let (call, host_id) = match call.split_once('#') {
            Some((call, id)) if !id.is_empty() => (call, Some(id.to_string())),
            Some(_) => return None,
            None => (call, None),
        };
        let (token, method) = call.split_once('.')?;
        if !is_valid_token(token) || !is_valid_method(method) {
            return None;
        }

        Some(Self {
            event,
            key_filter,
            options,
            token: token.to_string(),
            method: method.to_string(),
            host_id,
        })
    }

    /// Event this descriptor listens for on `element`
    pub fn event_type(&self, document: &Document, element: NodeId) -> String {
        match &self.event {
            Some(event) => event.clone(),
            None => default_event(document, element).to_string(),
        }
    }
}

fn is_valid_method(method: &str) -> bool {
    let mut chars = method.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Event inferred for a descriptor without `->`
pub fn default_event(document: &Document, element: NodeId) -> &'static str {
    match document.tag_name(element) {
        Some("form") => "submit",
        Some("input") => {
            if document
                .get_attribute(element, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case("submit"))
            {
                "click"
            } else {
                "input"
            }
        }
        Some("textarea") => "input",
        Some("select") => "change",
        Some("details") => "toggle",
        _ => "click",
    }
}

/// Split an attribute value into descriptors on whitespace outside `[...]`
pub fn split_descriptors(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;

    for (i, c) in value.char_indices() {
        match c {
            '[' => {
                depth += 1;
                start.get_or_insert(i);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    out.push(&value[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        out.push(&value[s..]);
    }
    out
}

/// Parameters for `token.method` read from `element`
///
/// The bulk `data-<token>.<method>` JSON object comes first; individual
/// `data-<token>.<method>.<param>` attributes override its keys.
pub fn gather_params(document: &Document, element: NodeId, config: &Config, token: &str, method: &str) -> Params {
    let base = config.scoped_attribute(token, &to_kebab_case(method));
    let mut params = Params::new();

    if let Some(raw) = document.get_attribute(element, &base) {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => params.extend(map),
            _ => tracing::debug!(attribute = %base, %element, "ignoring non-object action parameters"),
        }
    }

    let prefix = format!("{base}.");
    for (name, value) in document.attributes(element) {
        match name.strip_prefix(prefix.as_str()) {
            Some(param) if !param.is_empty() => {
                params.insert(to_camel_case(param), decode_untyped(value));
            }
            _ => {}
        }
    }
    params
}
