//! Commands, groups and their builder
//!
//! A [`Command`] is the registered record: names, parameters, checks,
//! cooldowns and the body to run. A group is a command whose
//! [`CommandKind`] carries a child [`CommandMap`]; its own body runs when no
//! subcommand is selected.
//!
//! Commands are described with a [`CommandBuilder`] and turned into
//! [`Command`]s when registered, which is where parameter types are looked
//! up, cooldowns validated and settings-derived names resolved.

use std::fmt;
use std::time::Duration;

use chatbot_settings::Settings;

use crate::args::Arguments;
use crate::checks::Check;
use crate::converters::ConverterRegistry;
use crate::cooldown::{Cooldown, CooldownMapping};
use crate::error::{CommandError, RegResult, RegistrationError};
use crate::events::{ErrorHook, Event, EventKind, Listener};
use crate::invocation::{Channel, ChatMessage, Identity, Invocation, Platform};
use crate::params::{bind_parameters, ParamDecl, Parameter};
use crate::registry::CommandMap;
use crate::scheduler::{Delivery, Outbox, Scheduled};

/// Names of the form `settings::KEY` are read from settings
pub const SETTINGS_NAME_PREFIX: &str = "settings::";

/// Help text for commands that do not provide any
pub const DEFAULT_HELP: &str = "No help given.";

// =============================================================================
// Execution Context
// =============================================================================

/// What a command body can see and do
pub struct CommandContext<'a> {
    invocation: &'a Invocation,
    outbox: &'a mut Outbox,
}

impl<'a> CommandContext<'a> {
    pub fn new(invocation: &'a Invocation, outbox: &'a mut Outbox) -> Self {
        Self { invocation, outbox }
    }

    pub fn invocation(&self) -> &Invocation {
        self.invocation
    }

    pub fn message(&self) -> &ChatMessage {
        &self.invocation.message
    }

    pub fn author(&self) -> &Identity {
        self.invocation.author()
    }

    pub fn channel(&self) -> Channel {
        self.invocation.channel()
    }

    pub fn platform(&self) -> Platform {
        self.invocation.channel().platform
    }

    /// Reply on the channel the message came from
    pub fn reply(&mut self, text: &str) -> Delivery {
        self.reply_with(text, false, Duration::ZERO)
    }

    /// Reply with optional highlight, possibly deferred by `delay`
    pub fn reply_with(&mut self, text: &str, highlight: bool, delay: Duration) -> Delivery {
        let channel = self.channel();
        let now = self.invocation.timestamp();
        self.outbox.send(channel, text, highlight, delay, now)
    }

    /// Reply privately to the author
    pub fn whisper(&mut self, text: &str) -> Delivery {
        let channel = Channel::whisper(self.platform());
        let now = self.invocation.timestamp();
        self.outbox.send(channel, text, false, Duration::ZERO, now)
    }

    /// Emit a custom event once `delay` has passed
    pub fn schedule_event(&mut self, name: &str, payload: serde_json::Value, delay: Duration) {
        let due = self.invocation.timestamp().saturating_add(delay);
        self.outbox.queue_mut().push(
            due,
            Scheduled::Event {
                name: name.to_string(),
                payload,
            },
        );
    }
}

// =============================================================================
// Bodies and Hooks
// =============================================================================

/// A command body
///
/// Implemented for closures; implement it directly for stateful commands.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: &mut CommandContext<'_>, args: &Arguments) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut CommandContext<'_>, &Arguments) -> anyhow::Result<()> + Send + Sync,
{
    fn call(&self, ctx: &mut CommandContext<'_>, args: &Arguments) -> anyhow::Result<()> {
        self(ctx, args)
    }
}

/// Runs immediately before or after a command body
pub type Hook = Box<dyn Fn(&Invocation) -> anyhow::Result<()> + Send + Sync>;

fn noop(_ctx: &mut CommandContext<'_>, _args: &Arguments) -> anyhow::Result<()> {
    Ok(())
}

// =============================================================================
// Command Record
// =============================================================================

/// Where a command's name comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    /// Given literally at registration
    Literal,
    /// Read from this settings key, re-read on reload
    Setting(String),
}

/// Channel restrictions, evaluated alongside the command's checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    pub stream_only: bool,
    pub discord_only: bool,
    pub whisper_only: bool,
}

/// Group-specific data
pub struct Group {
    pub(crate) children: CommandMap,
    pub(crate) dispatch_without_command: bool,
}

impl Group {
    pub fn children(&self) -> &CommandMap {
        &self.children
    }

    /// Whether the group runs itself when the next word is not a subcommand
    pub fn dispatch_without_command(&self) -> bool {
        self.dispatch_without_command
    }
}

/// Plain command or group
pub enum CommandKind {
    Leaf,
    Group(Group),
}

/// A registered command
pub struct Command {
    pub(crate) name: String,
    name_source: NameSource,
    pub(crate) aliases: Vec<String>,
    help: String,
    params: Vec<Parameter>,
    checks: Vec<Check>,
    cooldowns: Vec<CooldownMapping>,
    flags: CommandFlags,
    ignore_extra: bool,
    enabled: bool,
    node: Option<String>,
    handler: Box<dyn Handler>,
    pre_invoke: Option<Hook>,
    post_invoke: Option<Hook>,
    pub(crate) kind: CommandKind,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("params", &self.params.iter().map(|p| &p.name).collect::<Vec<_>>())
            .field("checks", &self.checks)
            .field("group", &self.is_group())
            .finish()
    }
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_source(&self) -> &NameSource {
        &self.name_source
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// First line of the help text
    pub fn short_help(&self) -> &str {
        self.help.lines().next().unwrap_or("")
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn cooldowns(&self) -> &[CooldownMapping] {
        &self.cooldowns
    }

    pub(crate) fn cooldowns_mut(&mut self) -> &mut [CooldownMapping] {
        &mut self.cooldowns
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub fn ignore_extra(&self) -> bool {
        self.ignore_extra
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Node that installed this command, if any
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub(crate) fn set_node(&mut self, node: &str) {
        self.node = Some(node.to_string());
        if let CommandKind::Group(group) = &mut self.kind {
            for child in group.children.commands_mut() {
                child.set_node(node);
            }
        }
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn pre_invoke(&self) -> Option<&Hook> {
        self.pre_invoke.as_ref()
    }

    pub fn post_invoke(&self) -> Option<&Hook> {
        self.post_invoke.as_ref()
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, CommandKind::Group(_))
    }

    pub fn group(&self) -> Option<&Group> {
        match &self.kind {
            CommandKind::Group(group) => Some(group),
            CommandKind::Leaf => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut Group> {
        match &mut self.kind {
            CommandKind::Group(group) => Some(group),
            CommandKind::Leaf => None,
        }
    }

    /// Usage line: `name <a> [b] <rest...>`
    pub fn usage(&self) -> String {
        std::iter::once(self.name.clone())
            .chain(self.params.iter().map(Parameter::usage))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Names of the implicit checks that reject this channel
    pub fn flag_failures(&self, channel: Channel) -> Vec<String> {
        let mut failed = Vec::new();
        if !self.enabled {
            failed.push("enabled".to_string());
        }
        if self.flags.stream_only && !channel.platform.is_stream_service() {
            failed.push("stream_only".to_string());
        }
        if self.flags.discord_only && channel.platform != Platform::Discord {
            failed.push("discord_only".to_string());
        }
        if self.flags.whisper_only && !channel.whisper {
            failed.push("whisper_only".to_string());
        }
        failed
    }
}

// =============================================================================
// Names
// =============================================================================

/// Names must be non-empty and contain no whitespace
pub fn validate_name(name: &str) -> RegResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(RegistrationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Read a command name from settings, dropping any chat prefix
pub fn name_from_settings(settings: &Settings, key: &str) -> RegResult<String> {
    let raw = settings
        .require_str(key)
        .map_err(|source| RegistrationError::UnknownSetting {
            key: key.to_string(),
            source,
        })?;
    let name = settings.strip_prefix(raw.trim()).to_string();
    validate_name(&name)?;
    Ok(name)
}

// =============================================================================
// Builder
// =============================================================================

/// Everything needed to turn a builder into a command
pub struct BuildEnv<'a> {
    pub converters: &'a ConverterRegistry,
    pub settings: &'a Settings,
}

struct GroupDecl {
    children: Vec<CommandBuilder>,
    dispatch_without_command: bool,
    case_insensitive: bool,
}

/// Describes a command before registration
///
/// # Example
///
/// ```rust
/// use chatbot_cmd::{checks, CommandBuilder, ParamDecl};
///
/// let give = CommandBuilder::new("give")
///     .alias("gift")
///     .help("Give points to another user")
///     .param(ParamDecl::required("target", "user"))
///     .param(ParamDecl::required("amount", "int"))
///     .check(checks::moderator())
///     .user_cooldown(5.0, 1)
///     .handler(|ctx, args| {
///         let amount = args.get_int_or("amount", 0);
///         ctx.reply(&format!("gave {} points", amount));
///         Ok(())
///     });
/// ```
pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    help: Option<String>,
    params: Vec<ParamDecl>,
    checks: Vec<Check>,
    cooldowns: Vec<Cooldown>,
    flags: CommandFlags,
    ignore_extra: Option<bool>,
    enabled: bool,
    handler: Option<Box<dyn Handler>>,
    pre_invoke: Option<Hook>,
    post_invoke: Option<Hook>,
    group: Option<GroupDecl>,
}

impl CommandBuilder {
    /// Start a command; `settings::KEY` takes the name from settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            help: None,
            params: Vec::new(),
            checks: Vec::new(),
            cooldowns: Vec::new(),
            flags: CommandFlags::default(),
            ignore_extra: None,
            enabled: true,
            handler: None,
            pre_invoke: None,
            post_invoke: None,
            group: None,
        }
    }

    /// Start a command named by the settings key `key`
    pub fn from_setting(key: &str) -> Self {
        Self::new(format!("{}{}", SETTINGS_NAME_PREFIX, key))
    }

    /// Declared name, before settings resolution
    pub fn declared_name(&self) -> &str {
        &self.name
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldowns.push(cooldown);
        self
    }

    /// `rate` uses per `per` seconds for each author
    pub fn user_cooldown(self, per: f64, rate: u32) -> Self {
        self.cooldown(Cooldown::user(per, rate))
    }

    /// `rate` uses per `per` seconds shared by everybody
    pub fn global_cooldown(self, per: f64, rate: u32) -> Self {
        self.cooldown(Cooldown::global(per, rate))
    }

    pub fn stream_only(mut self) -> Self {
        self.flags.stream_only = true;
        self
    }

    pub fn discord_only(mut self) -> Self {
        self.flags.discord_only = true;
        self
    }

    pub fn whisper_only(mut self) -> Self {
        self.flags.whisper_only = true;
        self
    }

    /// Accept (true) or reject (false) input left after the last parameter
    pub fn ignore_extra(mut self, ignore: bool) -> Self {
        self.ignore_extra = Some(ignore);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Body to run; for groups, runs when no subcommand is selected
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut CommandContext<'_>, &Arguments) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Body given as a [`Handler`] implementation
    pub fn handler_impl<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn pre_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pre_invoke = Some(Box::new(hook));
        self
    }

    pub fn post_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_invoke = Some(Box::new(hook));
        self
    }

    fn group_decl(&mut self) -> &mut GroupDecl {
        self.group.get_or_insert_with(|| GroupDecl {
            children: Vec::new(),
            dispatch_without_command: true,
            case_insensitive: false,
        })
    }

    /// Make this a group, even without subcommands
    pub fn group(mut self) -> Self {
        self.group_decl();
        self
    }

    /// Add a subcommand, making this a group
    pub fn subcommand(mut self, child: CommandBuilder) -> Self {
        self.group_decl().children.push(child);
        self
    }

    /// Whether an unknown word after the group name still runs the group
    pub fn dispatch_without_command(mut self, value: bool) -> Self {
        self.group_decl().dispatch_without_command = value;
        self
    }

    /// Subcommand lookup ignores case
    pub fn case_insensitive(mut self, value: bool) -> Self {
        self.group_decl().case_insensitive = value;
        self
    }

    /// Resolve names, parameter types and cooldowns into a [`Command`]
    pub fn build(self, env: &BuildEnv<'_>) -> RegResult<Command> {
        let (name, name_source) = match self.name.strip_prefix(SETTINGS_NAME_PREFIX) {
            Some(key) => (
                name_from_settings(env.settings, key)?,
                NameSource::Setting(key.to_string()),
            ),
            None => (self.name.clone(), NameSource::Literal),
        };
        validate_name(&name)?;
        for alias in &self.aliases {
            validate_name(alias)?;
        }

        let params = bind_parameters(&name, self.params, env.converters)?;

        let mut cooldowns = Vec::with_capacity(self.cooldowns.len());
        for cooldown in self.cooldowns {
            cooldown
                .validate()
                .map_err(|reason| RegistrationError::InvalidCooldown {
                    command: name.clone(),
                    reason,
                })?;
            cooldowns.push(CooldownMapping::new(cooldown));
        }

        let kind = match self.group {
            None => CommandKind::Leaf,
            Some(decl) => {
                let mut children = CommandMap::new(decl.case_insensitive);
                for child in decl.children {
                    children.insert(child.build(env)?)?;
                }
                CommandKind::Group(Group {
                    children,
                    dispatch_without_command: decl.dispatch_without_command,
                })
            }
        };

        log::debug!("built command {} ({} parameters)", name, params.len());

        Ok(Command {
            name,
            name_source,
            aliases: self.aliases,
            help: self.help.unwrap_or_else(|| DEFAULT_HELP.to_string()),
            params,
            checks: self.checks,
            cooldowns,
            flags: self.flags,
            ignore_extra: self
                .ignore_extra
                .unwrap_or_else(|| env.settings.ignore_extra_default()),
            enabled: self.enabled,
            node: None,
            handler: self.handler.unwrap_or_else(|| Box::new(noop)),
            pre_invoke: self.pre_invoke,
            post_invoke: self.post_invoke,
            kind,
        })
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A bundle of commands and listeners installed and removed together
pub struct Node {
    pub(crate) name: String,
    pub(crate) commands: Vec<CommandBuilder>,
    pub(crate) listeners: Vec<(EventKind, Listener)>,
    pub(crate) error_hook: Option<ErrorHook>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            listeners: Vec::new(),
            error_hook: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(mut self, command: CommandBuilder) -> Self {
        self.commands.push(command);
        self
    }

    pub fn listener<F>(mut self, kind: EventKind, listener: F) -> Self
    where
        F: FnMut(&Event) -> anyhow::Result<()> + Send + 'static,
    {
        self.listeners.push((kind, Box::new(listener)));
        self
    }

    /// Also hand this node's listener failures to `hook`
    ///
    /// The bot's error sink still sees them first.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CommandError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Box::new(hook));
        self
    }
}

/// What an installed node contributed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    /// Canonical names of its top-level commands
    pub commands: Vec<String>,
    pub listeners: usize,
}
