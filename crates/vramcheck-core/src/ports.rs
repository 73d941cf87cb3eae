//! Collaborators the presentation layer plugs in: an analytics sink and a
//! theme preference store. The estimates never see either.

use serde::Serialize;

/// Fire-and-forget analytics event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub category: &'static str,
    pub action: &'static str,
    pub label: Option<String>,
}

impl Event {
    pub fn new(category: &'static str, action: &'static str) -> Self {
        Event {
            category,
            action,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

/// Keeps events in memory, in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: std::cell::RefCell<Vec<Event>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

/// Dark/light preference with a system fallback.
pub trait ThemeStore {
    /// Preference the user saved, if any.
    fn stored(&self) -> Option<bool>;

    fn store(&mut self, dark: bool);

    fn system_prefers_dark(&self) -> bool;

    fn is_dark(&self) -> bool {
        self.stored().unwrap_or_else(|| self.system_prefers_dark())
    }
}

/// Theme store that lives only as long as the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTheme {
    pub stored: Option<bool>,
    pub system_dark: bool,
}

impl ThemeStore for MemoryTheme {
    fn stored(&self) -> Option<bool> {
        self.stored
    }

    fn store(&mut self, dark: bool) {
        self.stored = Some(dark);
    }

    fn system_prefers_dark(&self) -> bool {
        self.system_dark
    }
}

/// Flip the theme, persist the choice and report it. Returns the new mode.
pub fn toggle_theme(store: &mut dyn ThemeStore, sink: &dyn EventSink) -> bool {
    let dark = !store.is_dark();
    store.store(dark);
    let label = if dark {
        "Enable Dark Mode"
    } else {
        "Enable Light Mode"
    };
    sink.emit(Event::new("UI", "Toggle Dark Mode").with_label(label));
    dark
}
