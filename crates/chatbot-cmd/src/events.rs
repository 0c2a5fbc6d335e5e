//! Listener bus
//!
//! Listeners subscribe to an [`EventKind`] and run in subscription order
//! whenever the bot emits that kind. A failing or panicking listener is
//! reported to the error sink and the remaining listeners still run. An owner
//! may also register an error hook that sees its own listeners' failures.

use std::fmt;

use ahash::AHashMap;

use crate::error::CommandError;
use crate::host::ErrorSink;
use crate::invocation::ChatMessage;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The bot finished starting up
    Init,
    /// The host's periodic tick
    Tick,
    /// The bot is shutting down
    Unload,
    /// New settings were applied
    SettingsReloaded,
    /// A chat message arrived, before command dispatch
    Message,
    /// Host- or command-defined event
    Custom(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Init => f.write_str("init"),
            EventKind::Tick => f.write_str("tick"),
            EventKind::Unload => f.write_str("unload"),
            EventKind::SettingsReloaded => f.write_str("settings_reloaded"),
            EventKind::Message => f.write_str("message"),
            EventKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// An emitted event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    /// Set for [`EventKind::Message`]
    pub message: Option<ChatMessage>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
            message: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn message(message: ChatMessage) -> Self {
        Self {
            kind: EventKind::Message,
            payload: serde_json::Value::Null,
            message: Some(message),
        }
    }
}

/// Event callback
pub type Listener = Box<dyn FnMut(&Event) -> anyhow::Result<()> + Send>;

/// Per-owner failure callback, called after the error sink
pub type ErrorHook = Box<dyn Fn(&CommandError) + Send + Sync>;

struct Subscription {
    /// Node that installed the listener, if any
    owner: Option<String>,
    listener: Listener,
}

/// Listeners indexed by event kind
#[derive(Default)]
pub struct EventBus {
    listeners: AHashMap<EventKind, Vec<Subscription>>,
    error_hooks: AHashMap<String, ErrorHook>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener
    pub fn listen<F>(&mut self, kind: EventKind, owner: Option<&str>, listener: F)
    where
        F: FnMut(&Event) -> anyhow::Result<()> + Send + 'static,
    {
        self.listen_boxed(kind, owner, Box::new(listener));
    }

    /// Subscribe an already boxed listener
    pub fn listen_boxed(&mut self, kind: EventKind, owner: Option<&str>, listener: Listener) {
        self.listeners.entry(kind).or_default().push(Subscription {
            owner: owner.map(str::to_string),
            listener,
        });
    }

    /// Route failures of `owner`'s listeners to `hook` as well as the sink
    pub fn set_error_hook(&mut self, owner: &str, hook: ErrorHook) {
        self.error_hooks.insert(owner.to_string(), hook);
    }

    pub fn has_error_hook(&self, owner: &str) -> bool {
        self.error_hooks.contains_key(owner)
    }

    /// Drop every listener installed by `owner`; returns how many were removed
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        self.error_hooks.remove(owner);
        let mut removed = 0;
        for subs in self.listeners.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.owner.as_deref() != Some(owner));
            removed += before - subs.len();
        }
        self.listeners.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Number of listeners for `kind`
    pub fn count(&self, kind: &EventKind) -> usize {
        self.listeners.get(kind).map_or(0, Vec::len)
    }

    /// Run every listener for the event; returns how many failed
    pub fn emit(&mut self, event: &Event, sink: &dyn ErrorSink) -> usize {
        let Some(subs) = self.listeners.get_mut(&event.kind) else {
            return 0;
        };
        let mut failures = 0;
        for sub in subs.iter_mut() {
            let context = format!("listener for {}", event.kind);
            if let Err(err) = CommandError::guard(context, || (sub.listener)(event)) {
                failures += 1;
                sink.report_error(&err);
                let hook = sub.owner.as_deref().and_then(|o| self.error_hooks.get(o));
                if let Some(hook) = hook {
                    let handled = CommandError::guard("error hook", || {
                        hook(&err);
                        Ok(())
                    });
                    if let Err(e) = handled {
                        log::warn!("error hook failed: {}", e);
                    }
                }
            }
        }
        failures
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(String, usize)> = self
            .listeners
            .iter()
            .map(|(k, v)| (k.to_string(), v.len()))
            .collect();
        let mut hooks: Vec<&str> = self.error_hooks.keys().map(String::as_str).collect();
        hooks.sort_unstable();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .field("error_hooks", &hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Invocation;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Errors(Mutex<Vec<String>>);

    impl ErrorSink for Errors {
        fn report_command_error(&self, _invocation: &Invocation, error: &CommandError) {
            self.0.lock().push(error.to_string());
        }

        fn report_error(&self, error: &CommandError) {
            self.0.lock().push(error.to_string());
        }
    }

    #[test]
    fn test_listeners_run_in_order_and_survive_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        let s = seen.clone();
        bus.listen(EventKind::Tick, None, move |_| {
            s.lock().push("first");
            Err(anyhow::anyhow!("nope"))
        });
        bus.listen(EventKind::Tick, None, |_| panic!("boom"));
        let s = seen.clone();
        bus.listen(EventKind::Tick, None, move |_| {
            s.lock().push("third");
            Ok(())
        });

        let errors = Errors::default();
        assert_eq!(bus.emit(&Event::new(EventKind::Tick), &errors), 2);
        assert_eq!(*seen.lock(), ["first", "third"]);
        assert_eq!(errors.0.lock().len(), 2);
        assert!(errors.0.lock()[0].contains("listener for tick"));
    }

    #[test]
    fn test_custom_events_and_owners() {
        let mut bus = EventBus::new();
        bus.listen(EventKind::Custom("raid".into()), Some("alerts"), |_| Ok(()));
        bus.listen(EventKind::Init, Some("alerts"), |_| Ok(()));
        bus.listen(EventKind::Init, None, |_| Ok(()));
        assert_eq!(bus.count(&EventKind::Custom("raid".into())), 1);

        assert_eq!(bus.remove_owner("alerts"), 2);
        assert_eq!(bus.count(&EventKind::Custom("raid".into())), 0);
        assert_eq!(bus.count(&EventKind::Init), 1);
        assert_eq!(bus.emit(&Event::new(EventKind::Unload), &Errors::default()), 0);
    }

    #[test]
    fn test_error_hook_sees_only_its_owner() {
        let hooked = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let h = hooked.clone();
        bus.set_error_hook("alerts", Box::new(move |err: &CommandError| h.lock().push(err.to_string())));
        bus.set_error_hook("quiet", Box::new(|_: &CommandError| panic!("hook broke")));

        bus.listen(EventKind::Tick, Some("alerts"), |_| Err(anyhow::anyhow!("alert failed")));
        bus.listen(EventKind::Tick, None, |_| Err(anyhow::anyhow!("loose failed")));
        bus.listen(EventKind::Tick, Some("quiet"), |_| Err(anyhow::anyhow!("quiet failed")));

        let errors = Errors::default();
        assert_eq!(bus.emit(&Event::new(EventKind::Tick), &errors), 3);
        assert_eq!(errors.0.lock().len(), 3);
        let hooked_now = hooked.lock().clone();
        assert_eq!(hooked_now.len(), 1);
        assert!(hooked_now[0].contains("alert failed"));

        bus.remove_owner("alerts");
        assert!(!bus.has_error_hook("alerts"));
        assert!(bus.has_error_hook("quiet"));
    }
}
