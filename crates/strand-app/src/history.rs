#![forbid(unsafe_code)]

//! URL-fragment history with an explicit start/stop lifecycle.
//!
//! [`History`] is an explicitly constructed, explicitly passed instance;
//! there is no ambient process-wide history. It resolves the current
//! fragment through a [`Location`] abstraction and picks a strategy at
//! [`start`](History::start): pushState when wanted and supported, hash
//! changes otherwise, and a host-driven polling mode when the location
//! supports neither native signal (the host calls
//! [`check_url`](History::check_url) every [`poll_interval`](History::poll_interval)).
//!
//! Route handlers are consulted most-recently-registered first and only
//! the first match fires.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use strand_core::Dispatcher;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history has already been started")]
    AlreadyStarted,
}

/// The browser-location seam: path, hash, and the capability flags the
/// strategy selection depends on.
pub trait Location {
    fn path(&self) -> String;
    /// The fragment after `#`, without the `#`.
    fn hash(&self) -> String;
    fn set_hash(&self, hash: &str);
    fn replace_hash(&self, hash: &str);
    fn push_state(&self, url: &str);
    fn replace_state(&self, url: &str);
    fn supports_push_state(&self) -> bool;
    fn supports_hash_change(&self) -> bool;
}

struct MemoryLocationInner {
    path: String,
    hash: String,
    push_state: bool,
    hash_change: bool,
    log: Vec<(String, bool)>,
}

/// In-memory [`Location`] for tests and headless hosts. Cloning shares
/// state.
#[derive(Clone)]
pub struct MemoryLocation {
    inner: Rc<RefCell<MemoryLocationInner>>,
}

impl MemoryLocation {
    /// A location supporting both pushState and hash changes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(true, true)
    }

    #[must_use]
    pub fn with_capabilities(push_state: bool, hash_change: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryLocationInner {
                path: "/".to_owned(),
                hash: String::new(),
                push_state,
                hash_change,
                log: Vec::new(),
            })),
        }
    }

    /// Every URL mutation performed, with its replace flag.
    #[must_use]
    pub fn log(&self) -> Vec<(String, bool)> {
        self.inner.borrow().log.clone()
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Location for MemoryLocation {
    fn path(&self) -> String {
        self.inner.borrow().path.clone()
    }

    fn hash(&self) -> String {
        self.inner.borrow().hash.clone()
    }

    fn set_hash(&self, hash: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.hash = hash.to_owned();
        inner.log.push((format!("#{hash}"), false));
    }

    fn replace_hash(&self, hash: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.hash = hash.to_owned();
        inner.log.push((format!("#{hash}"), true));
    }

    fn push_state(&self, url: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.path = url.to_owned();
        inner.log.push((url.to_owned(), false));
    }

    fn replace_state(&self, url: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.path = url.to_owned();
        inner.log.push((url.to_owned(), true));
    }

    fn supports_push_state(&self) -> bool {
        self.inner.borrow().push_state
    }

    fn supports_hash_change(&self) -> bool {
        self.inner.borrow().hash_change
    }
}

/// Strategy chosen at start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    PushState,
    HashChange,
    Polling,
}

#[derive(Clone, Debug)]
pub struct StartOptions {
    pub root: String,
    pub push_state: bool,
    pub hash_change: bool,
    /// Skip the initial route match.
    pub silent: bool,
    /// Polling cadence when neither native signal exists.
    pub interval: Duration,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            root: "/".to_owned(),
            push_state: false,
            hash_change: true,
            silent: false,
            interval: Duration::from_millis(50),
        }
    }
}

impl StartOptions {
    #[must_use]
    pub fn push_state(mut self) -> Self {
        self.push_state = true;
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NavigateOptions {
    /// Replay the route match synchronously.
    pub trigger: bool,
    /// Replace the current URL instead of adding an entry.
    pub replace: bool,
}

impl NavigateOptions {
    #[must_use]
    pub fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    #[must_use]
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }
}

struct RouteHandler {
    pattern: Regex,
    callback: Rc<dyn Fn(&str)>,
}

struct HistoryInner {
    dispatcher: Dispatcher,
    handlers: RefCell<Vec<RouteHandler>>,
    location: RefCell<Option<Rc<dyn Location>>>,
    started: Cell<bool>,
    mode: Cell<Mode>,
    fragment: RefCell<String>,
    root: RefCell<String>,
    interval: Cell<Duration>,
}

/// Fragment-to-callback dispatch over a [`Location`]. Cloning shares
/// state.
#[derive(Clone)]
pub struct History {
    inner: Rc<HistoryInner>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(HistoryInner {
                dispatcher: Dispatcher::new(),
                handlers: RefCell::new(Vec::new()),
                location: RefCell::new(None),
                started: Cell::new(false),
                mode: Cell::new(Mode::HashChange),
                fragment: RefCell::new(String::new()),
                root: RefCell::new("/".to_owned()),
                interval: Cell::new(Duration::from_millis(50)),
            }),
        }
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.inner.started.get()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode.get()
    }

    /// The cadence a polling host should call [`check_url`](Self::check_url) at.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.inner.interval.get()
    }

    #[must_use]
    pub fn fragment(&self) -> String {
        self.inner.fragment.borrow().clone()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Register a route. Later registrations are consulted first.
    pub fn route(&self, pattern: Regex, callback: impl Fn(&str) + 'static) {
        self.inner.handlers.borrow_mut().insert(
            0,
            RouteHandler {
                pattern,
                callback: Rc::new(callback),
            },
        );
    }

    /// Begin fragment handling. Returns whether the current fragment
    /// matched a route (always `false` when `silent`).
    pub fn start(
        &self,
        location: Rc<dyn Location>,
        options: StartOptions,
    ) -> Result<bool, HistoryError> {
        if self.inner.started.get() {
            return Err(HistoryError::AlreadyStarted);
        }
        self.inner.started.set(true);

        let trimmed = options.root.trim_matches('/');
        let root = if trimmed.is_empty() {
            "/".to_owned()
        } else {
            format!("/{trimmed}/")
        };
        *self.inner.root.borrow_mut() = root;

        let mode = if options.push_state && location.supports_push_state() {
            Mode::PushState
        } else if options.hash_change && location.supports_hash_change() {
            Mode::HashChange
        } else {
            Mode::Polling
        };
        self.inner.mode.set(mode);
        self.inner.interval.set(options.interval);
        *self.inner.location.borrow_mut() = Some(location);

        let fragment = self.current_fragment();
        *self.inner.fragment.borrow_mut() = fragment;

        if options.silent {
            Ok(false)
        } else {
            Ok(self.load_url(None))
        }
    }

    /// Disable fragment handling. Routes stay registered for a later
    /// restart.
    pub fn stop(&self) {
        self.inner.started.set(false);
        *self.inner.location.borrow_mut() = None;
    }

    /// Compare the location's fragment with the last seen one and replay
    /// route matching when it moved. Polling hosts call this on a timer;
    /// hash-change hosts call it from their change signal.
    pub fn check_url(&self) -> bool {
        if !self.inner.started.get() {
            return false;
        }
        let current = self.current_fragment();
        if current == *self.inner.fragment.borrow() {
            return false;
        }
        self.load_url(None)
    }

    /// Match the current (or given) fragment against the routes; the
    /// first match wins. Returns whether anything matched.
    pub fn load_url(&self, fragment_override: Option<&str>) -> bool {
        let fragment = match fragment_override {
            Some(fragment) => strip_fragment(fragment),
            None => self.current_fragment(),
        };
        *self.inner.fragment.borrow_mut() = fragment.clone();

        let handlers: Vec<(Regex, Rc<dyn Fn(&str)>)> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|handler| (handler.pattern.clone(), Rc::clone(&handler.callback)))
            .collect();
        for (pattern, callback) in handlers {
            if pattern.is_match(&fragment) {
                callback(&fragment);
                return true;
            }
        }
        false
    }

    /// Update the URL to `fragment` and, with `trigger`, replay route
    /// matching. Same-fragment navigation is a no-op returning `false`.
    pub fn navigate(&self, fragment: &str, options: NavigateOptions) -> bool {
        if !self.inner.started.get() {
            return false;
        }
        let fragment = strip_fragment(fragment);
        if *self.inner.fragment.borrow() == fragment {
            return false;
        }
        *self.inner.fragment.borrow_mut() = fragment.clone();

        let url = format!("{}{}", self.inner.root.borrow(), fragment);
        let location = self.inner.location.borrow().clone();
        if let Some(location) = location {
            match self.inner.mode.get() {
                Mode::PushState => {
                    if options.replace {
                        location.replace_state(&url);
                    } else {
                        location.push_state(&url);
                    }
                }
                Mode::HashChange | Mode::Polling => {
                    let hash = format!("/{fragment}");
                    if options.replace {
                        location.replace_hash(&hash);
                    } else {
                        location.set_hash(&hash);
                    }
                }
            }
        }

        if options.trigger {
            self.load_url(Some(&fragment));
        }
        true
    }

    fn current_fragment(&self) -> String {
        let Some(location) = self.inner.location.borrow().clone() else {
            return String::new();
        };
        match self.inner.mode.get() {
            Mode::PushState => {
                let path = location.path();
                let root = self.inner.root.borrow().clone();
                let base = root.trim_end_matches('/');
                let remainder = path.strip_prefix(base).unwrap_or(&path);
                strip_fragment(remainder)
            }
            Mode::HashChange | Mode::Polling => strip_fragment(&location.hash()),
        }
    }
}

/// Strip one leading `#`, one leading `/`, and trailing whitespace.
fn strip_fragment(raw: &str) -> String {
    let trimmed = raw.trim_end();
    let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    trimmed.to_owned()
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("started", &self.inner.started.get())
            .field("mode", &self.inner.mode.get())
            .field("fragment", &self.inner.fragment.borrow())
            .finish()
    }
}
