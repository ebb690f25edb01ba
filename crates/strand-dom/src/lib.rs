#![forbid(unsafe_code)]

//! A headless element tree standing in for the browser DOM.
//!
//! The binding engine needs somewhere to hang declarative attributes, typed
//! properties, and event listeners; this crate provides that surface without
//! a browser. A real-DOM backend would implement the same shape over
//! `web-sys` nodes.

pub mod element;
pub mod event;

pub use element::Element;
pub use event::{DomEvent, DomListenerId, key};
