#![forbid(unsafe_code)]

//! One-shot commands executed in response to context events.

use strand_core::Event;

use crate::context::Context;

/// A command is instantiated per matching event, executed once, and
/// discarded.
pub trait Command {
    fn execute(&mut self);
}

/// What a command factory receives: the triggering event and the context
/// that dispatched it.
#[derive(Clone)]
pub struct CommandScope {
    pub context: Context,
    pub event: Event,
}

/// Closure adapter for simple commands.
pub struct FnCommand {
    body: Box<dyn FnMut()>,
}

impl FnCommand {
    #[must_use]
    pub fn new(body: impl FnMut() + 'static) -> Self {
        Self {
            body: Box::new(body),
        }
    }
}

impl Command for FnCommand {
    fn execute(&mut self) {
        (self.body)();
    }
}
