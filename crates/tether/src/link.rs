//! Target links
//!
//! `data-connect="menu.item"` makes an element a target of the nearest
//! scoped `menu` host; `menu.item#main-menu` targets the host with that id
//! wherever it lives.

use crate::ControllerId;
use crate::naming::is_valid_token;

/// Parsed `<token>.<type>[#hostId]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub token: String,
    pub target_type: String,
    pub host_id: Option<String>,
}

impl LinkDescriptor {
    /// Parse one descriptor, `None` when malformed
    pub fn parse(raw: &str) -> Option<Self> {
        let (reference, host_id) = match raw.split_once('#') {
            Some((reference, id)) if !id.is_empty() => (reference, Some(id.to_string())),
            Some(_) => return None,
            None => (raw, None),
        };
        let (token, target_type) = reference.split_once('.')?;
        if !is_valid_token(token) || target_type.is_empty() || target_type.contains('.') {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            target_type: target_type.to_string(),
            host_id,
        })
    }
}

/// Resolution state of one (element, descriptor) link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    /// Local link with no owning host in scope
    Unresolved,
    /// Remote link waiting for its host id to appear
    Orphaned,
    Connected(ControllerId),
}

#[derive(Debug, Clone)]
pub(crate) struct ElementLink {
    pub descriptor: LinkDescriptor,
    pub state: LinkState,
}
