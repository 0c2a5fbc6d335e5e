//! The bot facade
//!
//! [`Bot`] owns everything a host needs to hand chat input to the engine:
//! settings, the command tree, installed nodes, listeners, the scheduled
//! queue and the host collaborators. All mutation goes through `&mut Bot`,
//! so dispatch, registration and ticks never interleave.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use chatbot_settings::Settings;

use crate::command::{name_from_settings, BuildEnv, Command, CommandBuilder, Node, NodeInfo};
use crate::converters::ConverterRegistry;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{RegResult, RegistrationError};
use crate::events::{Event, EventBus, EventKind};
use crate::host::{
    ErrorSink, EveryoneOnly, IdentityResolver, LogErrorSink, LogReplySink, NoIdentities,
    PermissionBackend, ReplySink,
};
use crate::invocation::{Channel, ChatMessage, Identity};
use crate::registry::{CommandMap, Removed};
use crate::scheduler::{Delivery, Outbox, Scheduled};

/// Chat command engine
pub struct Bot {
    settings: Settings,
    commands: CommandMap,
    converters: ConverterRegistry,
    nodes: AHashMap<String, NodeInfo>,
    events: EventBus,
    outbox: Outbox,
    identities: Arc<dyn IdentityResolver>,
    permissions: Arc<dyn PermissionBackend>,
    errors: Arc<dyn ErrorSink>,
}

impl Default for Bot {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Bot {
    /// Create a bot with logging sinks and no user directory
    pub fn new(settings: Settings) -> Self {
        let outbox = Outbox::new(Arc::new(LogReplySink), settings.reply_delay_threshold());
        Self {
            commands: CommandMap::new(settings.case_insensitive()),
            settings,
            converters: ConverterRegistry::with_builtins(),
            nodes: AHashMap::new(),
            events: EventBus::new(),
            outbox,
            identities: Arc::new(NoIdentities),
            permissions: Arc::new(EveryoneOnly),
            errors: Arc::new(LogErrorSink),
        }
    }

    pub fn with_identities(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionBackend>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_reply_sink(mut self, replies: Arc<dyn ReplySink>) -> Self {
        self.outbox.set_sink(replies);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Register custom converters here before registering commands that use them
    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    // =========================================================================
    // Command Tree
    // =========================================================================

    /// Top-level commands
    pub fn commands(&self) -> &CommandMap {
        &self.commands
    }

    fn build(&self, builder: CommandBuilder) -> RegResult<Command> {
        builder.build(&BuildEnv {
            converters: &self.converters,
            settings: &self.settings,
        })
    }

    /// Add a top-level command or group
    pub fn register(&mut self, builder: CommandBuilder) -> RegResult<()> {
        let command = self.build(builder)?;
        let name = command.name().to_string();
        self.commands.insert(command)?;
        log::info!("registered command {}", name);
        Ok(())
    }

    /// Add a subcommand to the group at `parent`
    pub fn register_under(&mut self, parent: &str, builder: CommandBuilder) -> RegResult<()> {
        let mut command = self.build(builder)?;
        let path = self
            .commands
            .canonical_path(parent)
            .ok_or_else(|| RegistrationError::UnknownCommand(parent.to_string()))?;
        let target = self
            .commands
            .get_path_mut(&path)
            .ok_or_else(|| RegistrationError::UnknownCommand(parent.to_string()))?;
        if let Some(node) = target.node().map(str::to_string) {
            command.set_node(&node);
        }
        let name = command.name().to_string();
        target
            .group_mut()
            .ok_or_else(|| RegistrationError::NotAGroup(parent.to_string()))?
            .children
            .insert(command)?;
        log::info!("registered command {} {}", path.join(" "), name);
        Ok(())
    }

    /// Remove a command or alias by (qualified) name
    ///
    /// An alias removes only itself; a name removes the command, its
    /// aliases and, for a group, everything beneath it.
    pub fn unregister(&mut self, path: &str) -> Option<Removed> {
        let segments: Vec<&str> = path.split_whitespace().collect();
        let (last, parents) = segments.split_last()?;
        let removed = if parents.is_empty() {
            self.commands.remove(last)?
        } else {
            self.commands
                .get_path_mut(parents)?
                .group_mut()?
                .children
                .remove(last)?
        };
        match &removed {
            Removed::Command(command) => log::info!("unregistered command {}", command.name()),
            Removed::Alias { alias, command } => log::info!("removed alias {} of {}", alias, command),
        }
        self.refresh_nodes();
        Some(removed)
    }

    /// Look up a command by space-separated qualified name
    pub fn get(&self, path: &str) -> Option<&Command> {
        self.commands.get_path(path)
    }

    /// Mutable lookup by qualified name
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Command> {
        let names = self.commands.canonical_path(path)?;
        self.commands.get_path_mut(&names)
    }

    /// Every command in the tree with its qualified name
    pub fn walk_all(&self) -> Vec<(String, &Command)> {
        self.commands.walk()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Install a node; nothing is installed if any of its names is taken
    pub fn add_node(&mut self, node: Node) -> RegResult<()> {
        let Node {
            name,
            commands,
            listeners,
            error_hook,
        } = node;
        if self.nodes.contains_key(&name) {
            return Err(RegistrationError::DuplicateNode(name));
        }

        let to_exists = |err: RegistrationError| match err {
            RegistrationError::DuplicateCommand(taken)
            | RegistrationError::DuplicateAlias { alias: taken, .. } => {
                RegistrationError::CommandExists {
                    node: name.clone(),
                    name: taken,
                }
            }
            other => other,
        };

        let mut staging = CommandMap::new(self.commands.case_insensitive());
        for builder in commands {
            let mut command = self.build(builder)?;
            command.set_node(&name);
            self.commands.check_insert(&command).map_err(to_exists)?;
            staging.insert(command).map_err(to_exists)?;
        }

        let mut names = Vec::new();
        for command in staging.into_commands() {
            names.push(command.name().to_string());
            self.commands.insert(command)?;
        }
        names.sort();

        let listener_count = listeners.len();
        for (kind, listener) in listeners {
            self.events.listen_boxed(kind, Some(&name), listener);
        }
        if let Some(hook) = error_hook {
            self.events.set_error_hook(&name, hook);
        }

        log::info!(
            "installed node {} ({} commands, {} listeners)",
            name,
            names.len(),
            listener_count
        );
        self.nodes.insert(
            name.clone(),
            NodeInfo {
                name,
                commands: names,
                listeners: listener_count,
            },
        );
        Ok(())
    }

    /// Remove a node with all of its commands and listeners
    pub fn remove_node(&mut self, name: &str) -> RegResult<NodeInfo> {
        let info = self
            .nodes
            .remove(name)
            .ok_or_else(|| RegistrationError::UnknownNode(name.to_string()))?;
        let owned: Vec<String> = self
            .commands
            .commands()
            .into_iter()
            .filter(|c| c.node() == Some(name))
            .map(|c| c.name().to_string())
            .collect();
        for command in &owned {
            self.commands.remove(command);
        }
        let listeners = self.events.remove_owner(name);
        log::info!(
            "removed node {} ({} commands, {} listeners)",
            name,
            owned.len(),
            listeners
        );
        Ok(info)
    }

    pub fn get_node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    /// Names of installed nodes, sorted
    pub fn nodes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn refresh_nodes(&mut self) {
        for info in self.nodes.values_mut() {
            let mut names: Vec<String> = self
                .commands
                .commands()
                .into_iter()
                .filter(|c| c.node() == Some(info.name.as_str()))
                .map(|c| c.name().to_string())
                .collect();
            names.sort();
            info.commands = names;
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Subscribe to an event kind
    pub fn listen<F>(&mut self, kind: EventKind, listener: F)
    where
        F: FnMut(&Event) -> anyhow::Result<()> + Send + 'static,
    {
        self.events.listen(kind, None, listener);
    }

    /// Run listeners for `kind`; returns how many failed
    pub fn emit(&mut self, kind: EventKind, payload: serde_json::Value) -> usize {
        self.emit_event(&Event::new(kind).with_payload(payload))
    }

    fn emit_event(&mut self, event: &Event) -> usize {
        self.events.emit(event, self.errors.as_ref())
    }

    /// Announce that the host is up
    pub fn init(&mut self) -> usize {
        self.emit(EventKind::Init, serde_json::Value::Null)
    }

    /// Announce shutdown and drop anything still scheduled
    pub fn unload(&mut self) -> usize {
        let failed = self.emit(EventKind::Unload, serde_json::Value::Null);
        let pending = self.outbox.queue().len();
        if pending > 0 {
            log::info!("dropping {} scheduled entries", pending);
        }
        self.outbox.queue_mut().clear();
        failed
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn dispatcher(&mut self) -> Dispatcher<'_> {
        Dispatcher {
            commands: &mut self.commands,
            settings: &self.settings,
            identities: self.identities.as_ref(),
            permissions: self.permissions.as_ref(),
            errors: self.errors.as_ref(),
            outbox: &mut self.outbox,
        }
    }

    /// Notify message listeners, then dispatch
    pub fn handle_message(&mut self, message: ChatMessage) -> DispatchOutcome {
        self.emit_event(&Event::message(message.clone()));
        self.dispatch(message)
    }

    /// Resolve and run the command in `message`
    pub fn dispatch(&mut self, message: ChatMessage) -> DispatchOutcome {
        self.dispatcher().dispatch(message)
    }

    /// Run the command at `path` on `text`, skipping checks and cooldowns
    pub fn invoke_unchecked(&mut self, path: &str, text: &str, message: ChatMessage) -> DispatchOutcome {
        log::info!("{} runs {} unchecked", message.author.name, path);
        self.dispatcher().invoke(path, text, message, false)
    }

    /// Dispatch `message` as if `identity` had sent it
    pub fn invoke_as(&mut self, identity: Identity, message: ChatMessage) -> DispatchOutcome {
        log::info!("{} runs as {}", message.author.name, identity.name);
        self.dispatch(message.with_author(identity))
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Send chat text now, or schedule it when `delay` reaches the threshold
    pub fn send(
        &mut self,
        channel: Channel,
        text: &str,
        highlight: bool,
        delay: Duration,
        now: Duration,
    ) -> Delivery {
        self.outbox.send(channel, text, highlight, delay, now)
    }

    /// Emit a custom event at `now + delay`
    pub fn schedule_event(
        &mut self,
        name: &str,
        payload: serde_json::Value,
        delay: Duration,
        now: Duration,
    ) {
        self.outbox.queue_mut().push(
            now.saturating_add(delay),
            Scheduled::Event {
                name: name.to_string(),
                payload,
            },
        );
    }

    /// Entries waiting in the scheduled queue
    pub fn pending(&self) -> usize {
        self.outbox.queue().len()
    }

    /// Fire due scheduled entries, then tick listeners
    ///
    /// At most `drain_cap` entries fire per call, earliest first. Returns
    /// how many fired.
    pub fn tick(&mut self, now: Duration) -> usize {
        let due = self
            .outbox
            .queue_mut()
            .drain_due(now, self.settings.drain_cap());
        let fired = due.len();
        for item in due {
            match item {
                Scheduled::Reply {
                    channel,
                    text,
                    highlight,
                } => self.outbox.deliver(channel, &text, highlight),
                Scheduled::Event { name, payload } => {
                    self.emit(EventKind::Custom(name), payload);
                }
            }
        }
        if fired > 0 {
            log::debug!("tick fired {} scheduled entries, {} pending", fired, self.pending());
        }
        self.emit(
            EventKind::Tick,
            serde_json::json!({ "now": now.as_secs_f64() }),
        );
        fired
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Apply a new settings payload
    ///
    /// Commands named from settings are renamed to match. If the payload is
    /// invalid or a rename would collide, nothing changes.
    pub fn reload_settings(&mut self, payload: &str) -> RegResult<()> {
        let fresh = Settings::from_json(payload)?;
        let resolve = |key: &str| name_from_settings(&fresh, key);
        self.commands.check_rebind(&resolve)?;
        self.commands.apply_rebind(&resolve)?;

        if fresh.case_insensitive() != self.commands.case_insensitive() {
            log::warn!("case_insensitive only takes effect on restart");
        }
        self.outbox.set_threshold(fresh.reply_delay_threshold());
        self.settings = fresh;
        self.refresh_nodes();
        log::info!("settings reloaded");
        self.emit(EventKind::SettingsReloaded, serde_json::Value::Null);
        Ok(())
    }
}
