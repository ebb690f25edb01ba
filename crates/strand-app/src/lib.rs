#![forbid(unsafe_code)]

//! Application layer: dependency-injection context, command bus, views,
//! declarative attribute binding, and fragment routing.

pub mod application;
pub mod binding;
pub mod command;
pub mod context;
pub mod history;
pub mod router;
pub mod view;

pub use application::Application;
pub use binding::{BindError, attributes};
pub use command::{Command, CommandScope, FnCommand};
pub use context::Context;
pub use history::{History, HistoryError, Location, MemoryLocation, NavigateOptions, StartOptions};
pub use router::{Router, RouterError};
pub use view::{View, ViewBuilder, ViewFactory, ViewSeed};
