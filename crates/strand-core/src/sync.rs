#![forbid(unsafe_code)]

//! The persistence contract: pluggable transports over a CRUD vocabulary.
//!
//! Models and collections never talk to a store directly; they hand a
//! [`SyncMethod`] plus a [`SyncTarget`] to a [`Transport`]. The default
//! [`RestTransport`] composes REST-style requests (JSON bodies, verb
//! mapping, legacy-server emulation flags) and delegates the actual I/O to
//! an [`HttpClient`] — network access itself is outside this crate.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::collection::Collection;
use crate::dispatch::Dispatcher;
use crate::event::{Event, kind};
use crate::model::Model;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// CRUD vocabulary understood by transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMethod {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl SyncMethod {
    /// The HTTP verb the REST transport maps this method to.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            SyncMethod::Create => "POST",
            SyncMethod::Read => "GET",
            SyncMethod::Update => "PUT",
            SyncMethod::Patch => "PATCH",
            SyncMethod::Delete => "DELETE",
        }
    }
}

/// Opaque handle for an issued request. There is no cancellation; the
/// handle exists for correlation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Mint a fresh handle. Transports call this once per issued request.
    #[must_use]
    pub fn next() -> Self {
        RequestHandle(NEXT_REQUEST.fetch_add(1, Ordering::Relaxed))
    }
}

/// A failed transport exchange.
#[derive(Clone, Debug)]
pub struct TransportFailure {
    pub message: String,
    pub status: Option<u16>,
}

impl TransportFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub type SuccessCallback = Box<dyn FnOnce(serde_json::Value)>;
pub type ErrorCallback = Box<dyn FnOnce(TransportFailure)>;

/// Options threaded through `fetch`/`save`/`destroy`/`create`.
pub struct SyncOptions {
    /// Defer local mutation until the store confirms.
    pub wait: bool,
    /// Save only the changed attributes (`PATCH`).
    pub patch: bool,
    /// Run the parse hook on responses (on by default).
    pub parse: bool,
    /// Collection fetch: route the response through `reset` instead of `set`.
    pub reset: bool,
    /// Override the derived endpoint.
    pub url: Option<String>,
    /// Override the request body attributes.
    pub attrs: Option<serde_json::Value>,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            wait: false,
            patch: false,
            parse: true,
            reset: false,
            url: None,
            attrs: None,
            success: None,
            error: None,
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }

    #[must_use]
    pub fn patch(mut self) -> Self {
        self.patch = true;
        self
    }

    #[must_use]
    pub fn reset(mut self) -> Self {
        self.reset = true;
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl FnOnce(serde_json::Value) + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(TransportFailure) + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("wait", &self.wait)
            .field("patch", &self.patch)
            .field("parse", &self.parse)
            .field("reset", &self.reset)
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("no url available: set url_root, a collection url, or options.url")]
    MissingUrl,
    #[error("no transport configured")]
    NoTransport,
}

/// What a sync operation is acting on.
#[derive(Clone)]
pub enum SyncTarget {
    Model(Model),
    Collection(Collection),
}

impl SyncTarget {
    pub fn url(&self) -> Result<String, SyncError> {
        match self {
            SyncTarget::Model(model) => model.url(),
            SyncTarget::Collection(collection) => {
                collection.url().ok_or(SyncError::MissingUrl)
            }
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SyncTarget::Model(model) => model.to_json(),
            SyncTarget::Collection(collection) => collection.to_json(),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        match self {
            SyncTarget::Model(model) => model.dispatcher().clone(),
            SyncTarget::Collection(collection) => collection.dispatcher().clone(),
        }
    }

    #[must_use]
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            SyncTarget::Model(model) => Some(model),
            SyncTarget::Collection(_) => None,
        }
    }
}

/// A pluggable persistence backend.
pub trait Transport {
    fn sync(
        &self,
        method: SyncMethod,
        target: SyncTarget,
        options: SyncOptions,
    ) -> Result<RequestHandle, SyncError>;
}

/// One composed HTTP exchange, ready for an [`HttpClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub verb: String,
    pub url: String,
    pub content_type: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// The I/O seam. Implementations perform the exchange and call `done`
/// exactly once, from the event loop, whenever the response arrives.
pub trait HttpClient {
    fn execute(
        &self,
        request: HttpRequest,
        done: Box<dyn FnOnce(Result<serde_json::Value, TransportFailure>)>,
    ) -> RequestHandle;
}

/// REST-style transport: CRUD → HTTP verbs, JSON bodies, and the legacy
/// `emulate_http`/`emulate_json` compatibility flags.
pub struct RestTransport {
    client: Rc<dyn HttpClient>,
    /// Tunnel `PUT`/`PATCH`/`DELETE` through `POST` with
    /// `X-HTTP-Method-Override`, for servers that can't read them.
    pub emulate_http: bool,
    /// Send the JSON body form-encoded under a `model` key.
    pub emulate_json: bool,
}

impl RestTransport {
    #[must_use]
    pub fn new(client: Rc<dyn HttpClient>) -> Self {
        Self {
            client,
            emulate_http: false,
            emulate_json: false,
        }
    }

    #[must_use]
    pub fn emulated(client: Rc<dyn HttpClient>) -> Self {
        Self {
            client,
            emulate_http: true,
            emulate_json: true,
        }
    }
}

impl Transport for RestTransport {
    fn sync(
        &self,
        method: SyncMethod,
        target: SyncTarget,
        mut options: SyncOptions,
    ) -> Result<RequestHandle, SyncError> {
        let mapped = method.verb();
        let url = match options.url.clone() {
            Some(url) => url,
            None => target.url()?,
        };

        let mut body = None;
        if matches!(
            method,
            SyncMethod::Create | SyncMethod::Update | SyncMethod::Patch
        ) {
            let json = options.attrs.clone().unwrap_or_else(|| target.to_json());
            body = Some(json.to_string());
        }

        let mut verb = mapped;
        let mut content_type = "application/json".to_owned();
        let mut headers = Vec::new();

        if self.emulate_json {
            content_type = "application/x-www-form-urlencoded".to_owned();
            body = body.map(|raw| format!("model={}", form_encode(&raw)));
        }

        if self.emulate_http && matches!(mapped, "PUT" | "PATCH" | "DELETE") {
            verb = "POST";
            headers.push(("X-HTTP-Method-Override".to_owned(), mapped.to_owned()));
            if self.emulate_json {
                let tunnel = format!("_method={mapped}");
                body = Some(match body {
                    Some(existing) => format!("{existing}&{tunnel}"),
                    None => tunnel,
                });
            }
        }

        target.dispatcher().dispatch(Event::new(kind::REQUEST));

        let request = HttpRequest {
            verb: verb.to_owned(),
            url,
            content_type,
            body,
            headers,
        };
        let success = options.success.take();
        let error = options.error.take();
        Ok(self.client.execute(
            request,
            Box::new(move |result| match result {
                Ok(response) => {
                    if let Some(callback) = success {
                        callback(response);
                    }
                }
                Err(failure) => {
                    if let Some(callback) = error {
                        callback(failure);
                    }
                }
            }),
        ))
    }
}

/// Percent-encode everything outside the URI "unreserved" set.
#[must_use]
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Form-encode a value for `application/x-www-form-urlencoded` bodies.
#[must_use]
pub fn form_encode(input: &str) -> String {
    encode_uri_component(input)
}
