#![forbid(unsafe_code)]

//! DOM-style events for the headless element tree.

use crate::element::Element;

/// Key names carried by keyboard events.
pub mod key {
    pub const ENTER: &str = "Enter";
    pub const ESCAPE: &str = "Escape";
}

/// Handle returned by [`Element::add_listener`], used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DomListenerId(pub(crate) u64);

/// An event delivered to element listeners (`input`, `change`, `click`,
/// `keydown`, …).
#[derive(Clone)]
pub struct DomEvent {
    kind: String,
    target: Element,
    key: Option<String>,
}

impl DomEvent {
    #[must_use]
    pub fn new(kind: impl Into<String>, target: Element) -> Self {
        Self {
            kind: kind.into(),
            target,
            key: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn target(&self) -> &Element {
        &self.target
    }

    /// The key name for keyboard events.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}
