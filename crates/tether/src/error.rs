//! Errors and diagnostics
//!
//! [`Error`] covers failures the caller must handle (registration and
//! configuration). Problems found in markup never fail an operation: they
//! are reported as [`Diagnostic`]s and the offending declaration is skipped.

use std::fmt;

use tether_dom::{DomError, NodeId, SelectorError};

/// Tether error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("controller `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("`{0}` is not a valid controller token")]
    InvalidToken(String),

    #[error("circular injection: {}", .0.join(" -> "))]
    InjectionCycle(Vec<String>),

    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Dom(#[from] DomError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Markup problem noticed while connecting elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A declaration names a token with no registered controller
    UnknownController { token: String, element: NodeId },
    /// A target or action descriptor could not be parsed
    MalformedDescriptor {
        attribute: String,
        descriptor: String,
        element: NodeId,
    },
    /// An action named a method the controller does not define
    MissingAction {
        token: String,
        method: String,
        element: NodeId,
    },
    /// An action fired but no connected host owns it
    UnresolvedAction { descriptor: String, element: NodeId },
    /// A target was linked under a type its controller does not declare
    UndeclaredTarget {
        token: String,
        target_type: String,
        element: NodeId,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownController { token, element } => {
                write!(f, "no controller registered for `{token}` (element {element})")
            }
            Self::MalformedDescriptor {
                attribute,
                descriptor,
                element,
            } => write!(f, "malformed {attribute} descriptor `{descriptor}` (element {element})"),
            Self::MissingAction { token, method, element } => {
                write!(f, "controller `{token}` has no action `{method}` (element {element})")
            }
            Self::UnresolvedAction { descriptor, element } => {
                write!(f, "no connected host for action `{descriptor}` (element {element})")
            }
            Self::UndeclaredTarget {
                token,
                target_type,
                element,
            } => write!(f, "controller `{token}` does not declare target `{target_type}` (element {element})"),
        }
    }
}

/// Receives diagnostics; replaces the default logger when installed
pub type DiagnosticHook = Box<dyn Fn(&Diagnostic)>;

pub(crate) fn log_diagnostic(diagnostic: &Diagnostic) {
    tracing::warn!("{diagnostic}");
}
