#![forbid(unsafe_code)]

//! The Todo example application: models, views, routing, and local
//! persistence wired through the Strand framework.

pub mod app;
pub mod dom;
pub mod model;

pub use app::{DemoError, TodoApp};
pub use dom::TodoDom;
pub use model::{TodoCollectionExt, todo_collection, todo_model};
