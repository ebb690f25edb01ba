#![forbid(unsafe_code)]

//! Dedicated attribute handlers: visibility, layout exclusion, content
//! injection, and class toggling.
//!
//! Visibility is class-driven, to be paired with a stylesheet: `st-hide`
//! keeps the element in the layout but invisible, `st-exclude` removes it
//! from the layout entirely. Handlers are invoked once at bind time and
//! again on every `change:<property>` from the bound source.

use strand_core::Value;
use strand_dom::Element;

/// Class applied by `st-hide`/`st-show`: invisible, still occupying space.
pub const HIDE_CLASS: &str = "st-hide";

/// Class applied by `st-exclude`/`st-include` and repeat templates:
/// removed from the layout.
pub const EXCLUDE_CLASS: &str = "st-exclude";

/// A dedicated handler for one reserved attribute name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Applier {
    Show,
    Hide,
    Include,
    Exclude,
    Html,
    Text,
    Class,
}

impl Applier {
    /// Look up the handler for a binding attribute name (the part after
    /// the `st-` prefix). The boolean reports whether the handler accepts
    /// multiple comma-separated bindings.
    pub(crate) fn lookup(name: &str) -> Option<(Applier, bool)> {
        match name {
            "show" => Some((Applier::Show, false)),
            "hide" => Some((Applier::Hide, false)),
            "include" => Some((Applier::Include, false)),
            "exclude" => Some((Applier::Exclude, false)),
            "html" => Some((Applier::Html, false)),
            "text" => Some((Applier::Text, false)),
            "class" => Some((Applier::Class, true)),
            _ => None,
        }
    }

    pub(crate) fn apply(self, value: &Value, element: &Element, param: Option<&str>) {
        match self {
            Applier::Show => element.toggle_class(HIDE_CLASS, !value.truthy()),
            Applier::Hide => element.toggle_class(HIDE_CLASS, value.truthy()),
            Applier::Include => element.toggle_class(EXCLUDE_CLASS, !value.truthy()),
            Applier::Exclude => element.toggle_class(EXCLUDE_CLASS, value.truthy()),
            Applier::Html => element.set_html(&value.display_text()),
            Applier::Text => element.set_text(&value.display_text()),
            Applier::Class => {
                if let Some(class) = param {
                    element.toggle_class(class, value.truthy());
                }
            }
        }
    }
}
