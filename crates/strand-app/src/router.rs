#![forbid(unsafe_code)]

//! Routers: pattern-to-callback dispatch over a [`History`].
//!
//! Patterns use `:name` for one required path segment, `(…)` for an
//! optional stretch, and `*name` for a greedy tail; they compile to
//! anchored regexes. Captured segments are percent-decoded before reaching
//! the callback; unmatched optional captures arrive as `None`.
//!
//! A router is built over an explicit [`History`] instance and registers
//! its routes there; within that history, the most recently declared route
//! wins when several match.

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

use strand_core::event::kind;
use strand_core::{Detail, Dispatcher, Event};

use crate::history::{History, NavigateOptions};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

struct RouterInner {
    dispatcher: Dispatcher,
    history: History,
}

/// Maps fragment patterns to callbacks and dispatches `route` events.
/// Cloning shares state.
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    #[must_use]
    pub fn new(history: &History) -> Self {
        Self {
            inner: Rc::new(RouterInner {
                dispatcher: Dispatcher::new(),
                history: history.clone(),
            }),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.inner.history
    }

    /// Bind `pattern` to `callback` under `name`. The callback receives
    /// the decoded captures; the router then dispatches `route:<name>` and
    /// `route` on itself plus `route` on the history.
    pub fn route(
        &self,
        pattern: &str,
        name: &str,
        callback: impl Fn(&[Option<String>]) + 'static,
    ) -> Result<(), RouterError> {
        let regex = compile_route(pattern)?;
        let router = self.clone();
        let name = name.to_owned();
        self.inner.history.route(regex.clone(), move |fragment| {
            let params = extract_parameters(&regex, fragment);
            callback(&params);
            let detail = Detail::Route {
                name: name.clone(),
                params: params.clone(),
            };
            router
                .inner
                .dispatcher
                .dispatch(Event::with_detail(kind::route_to(&name), detail.clone()));
            router
                .inner
                .dispatcher
                .dispatch(Event::with_detail(kind::ROUTE, detail.clone()));
            router
                .inner
                .history
                .dispatcher()
                .dispatch(Event::with_detail(kind::ROUTE, detail));
        });
        Ok(())
    }

    /// Proxy to [`History::navigate`].
    pub fn navigate(&self, fragment: &str, options: NavigateOptions) -> bool {
        self.inner.history.navigate(fragment, options)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("history", &self.inner.history)
            .finish()
    }
}

fn escape_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-{}\[\]+?.,\\^$|#\s]").expect("static pattern"))
}

fn optional_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((.*?)\)").expect("static pattern"))
}

fn named_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\(\?)?:\w+").expect("static pattern"))
}

fn splat_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\w+").expect("static pattern"))
}

/// Compile a route pattern to an anchored regex.
pub fn compile_route(pattern: &str) -> Result<Regex, RouterError> {
    let escaped = escape_pattern().replace_all(pattern, |caps: &Captures| {
        format!("\\{}", &caps[0])
    });
    let optional = optional_pattern().replace_all(&escaped, "(?:${1})?");
    let named = named_pattern().replace_all(&optional, |caps: &Captures| {
        if caps.get(1).is_some() {
            caps[0].to_owned()
        } else {
            "([^/]+)".to_owned()
        }
    });
    let splatted = splat_pattern().replace_all(&named, "(.*?)");
    let anchored = format!("^{splatted}$");
    Regex::new(&anchored).map_err(|source| RouterError::Pattern {
        pattern: pattern.to_owned(),
        source: Box::new(source),
    })
}

/// Decoded capture groups for a matched fragment. Unmatched optional
/// groups are `None`.
#[must_use]
pub fn extract_parameters(regex: &Regex, fragment: &str) -> Vec<Option<String>> {
    let Some(captures) = regex.captures(fragment) else {
        return Vec::new();
    };
    captures
        .iter()
        .skip(1)
        .map(|group| group.map(|m| percent_decode(m.as_str())))
        .collect()
}

/// Decode `%XX` escapes; invalid sequences pass through untouched.
#[must_use]
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemoryLocation, StartOptions};
    use std::cell::RefCell;

    fn started_history() -> History {
        let history = History::new();
        history
            .start(Rc::new(MemoryLocation::new()), StartOptions::default())
            .unwrap();
        history
    }

    #[test]
    fn splat_route_captures_the_fragment() {
        let history = started_history();
        let router = Router::new(&history);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let c = Rc::clone(&calls);
        router
            .route("*filter", "setFilter", move |params| {
                c.borrow_mut().push(params.to_vec());
            })
            .unwrap();

        router.navigate("completed", NavigateOptions::default().trigger());
        assert_eq!(
            *calls.borrow(),
            vec![vec![Some("completed".to_owned())]],
            "setFilter invoked exactly once with the fragment"
        );
    }

    #[test]
    fn named_segments_capture_one_segment_each() {
        let regex = compile_route("search/:query/p:page").unwrap();
        assert!(regex.is_match("search/rust/p2"));
        assert_eq!(
            extract_parameters(&regex, "search/rust/p2"),
            vec![Some("rust".to_owned()), Some("2".to_owned())]
        );
        assert!(!regex.is_match("search/a/b/p2"), ":query must not cross a slash");
    }

    #[test]
    fn optional_segment_yields_none_when_absent() {
        let regex = compile_route("docs(/:section)").unwrap();
        assert!(regex.is_match("docs"));
        assert!(regex.is_match("docs/intro"));
        assert_eq!(extract_parameters(&regex, "docs"), vec![None]);
        assert_eq!(
            extract_parameters(&regex, "docs/intro"),
            vec![Some("intro".to_owned())]
        );
    }

    #[test]
    fn splat_is_greedy_to_the_end() {
        let regex = compile_route("files/*path").unwrap();
        assert_eq!(
            extract_parameters(&regex, "files/a/b/c.txt"),
            vec![Some("a/b/c.txt".to_owned())]
        );
    }

    #[test]
    fn captures_are_percent_decoded() {
        let regex = compile_route(":name").unwrap();
        assert_eq!(
            extract_parameters(&regex, "hello%20world"),
            vec![Some("hello world".to_owned())]
        );
    }

    #[test]
    fn literal_specials_are_escaped() {
        let regex = compile_route("price+tax.txt").unwrap();
        assert!(regex.is_match("price+tax.txt"));
        assert!(!regex.is_match("priceXtax.txt"));
    }

    #[test]
    fn most_recent_route_wins() {
        let history = started_history();
        let router = Router::new(&history);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        router
            .route("*any", "catchAll", move |_| s.borrow_mut().push("catchAll"))
            .unwrap();
        let s = Rc::clone(&seen);
        router
            .route("completed", "completed", move |_| {
                s.borrow_mut().push("completed")
            })
            .unwrap();

        router.navigate("completed", NavigateOptions::default().trigger());
        assert_eq!(*seen.borrow(), ["completed"]);

        router.navigate("whatever", NavigateOptions::default().trigger());
        assert_eq!(*seen.borrow(), ["completed", "catchAll"]);
    }

    #[test]
    fn route_events_fire_on_router_and_history() {
        let history = started_history();
        let router = Router::new(&history);
        router.route("*f", "setFilter", |_| {}).unwrap();

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let k = Rc::clone(&kinds);
        router.dispatcher().on("route:setFilter route", move |event| {
            k.borrow_mut().push(event.kind().to_owned());
        });
        let history_routes = Rc::new(RefCell::new(0));
        let h = Rc::clone(&history_routes);
        history.dispatcher().on("route", move |event| {
            assert!(matches!(event.detail(), Detail::Route { name, .. } if name == "setFilter"));
            *h.borrow_mut() += 1;
        });

        router.navigate("abc", NavigateOptions::default().trigger());
        assert_eq!(*kinds.borrow(), ["route:setFilter", "route"]);
        assert_eq!(*history_routes.borrow(), 1);
    }

    #[test]
    fn percent_decode_leaves_invalid_sequences() {
        assert_eq!(percent_decode("a%2Fb"), "a/b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
