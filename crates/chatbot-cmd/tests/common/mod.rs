//! Shared doubles for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use chatbot_cmd::host::{ErrorSink, IdentityResolver, PermissionBackend, ReplySink};
use chatbot_cmd::{
    Bot, Channel, ChatMessage, CommandError, Identity, Invocation, Permission, Platform, Settings,
};
use parking_lot::Mutex;

/// One reported failure, flattened so it can be compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reported {
    /// Qualified command name; `None` for errors outside a command
    pub command: Option<String>,
    pub kind: &'static str,
    pub message: String,
}

fn kind_of(error: &CommandError) -> &'static str {
    match error {
        CommandError::UnexpectedQuote { .. } => "UnexpectedQuote",
        CommandError::UnterminatedQuote { .. } => "UnterminatedQuote",
        CommandError::InvalidEndOfQuotedString { .. } => "InvalidEndOfQuotedString",
        CommandError::Conversion { .. } => "Conversion",
        CommandError::BadArgument(_) => "BadArgument",
        CommandError::BadUnionArgument { .. } => "BadUnionArgument",
        CommandError::MissingArguments { .. } => "MissingArguments",
        CommandError::TooManyArguments { .. } => "TooManyArguments",
        CommandError::ChecksFailed { .. } => "ChecksFailed",
        CommandError::OnCooldown { .. } => "OnCooldown",
        CommandError::NoCommandFound(_) => "NoCommandFound",
        CommandError::ExceptionCaught { .. } => "ExceptionCaught",
    }
}

/// Error sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingErrors {
    reports: Mutex<Vec<Reported>>,
}

impl RecordingErrors {
    pub fn reports(&self) -> Vec<Reported> {
        self.reports.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.reports.lock().iter().map(|r| r.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ErrorSink for RecordingErrors {
    fn report_command_error(&self, invocation: &Invocation, error: &CommandError) {
        self.reports.lock().push(Reported {
            command: Some(invocation.command.clone()),
            kind: kind_of(error),
            message: error.to_string(),
        });
    }

    fn report_error(&self, error: &CommandError) {
        self.reports.lock().push(Reported {
            command: None,
            kind: kind_of(error),
            message: error.to_string(),
        });
    }
}

/// Reply sink that keeps everything sent
#[derive(Default)]
pub struct RecordingReplies {
    sent: Mutex<Vec<(Channel, String)>>,
}

impl RecordingReplies {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn sent(&self) -> Vec<(Channel, String)> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl ReplySink for RecordingReplies {
    fn send(&self, channel: Channel, text: &str) {
        self.sent.lock().push((channel, text.to_string()));
    }
}

/// User directory backed by a map of lowercase names
#[derive(Default)]
pub struct MapDirectory {
    users: AHashMap<String, Identity>,
}

impl MapDirectory {
    pub fn with(mut self, id: &str, name: &str) -> Self {
        self.users.insert(name.to_lowercase(), Identity::new(id, name));
        self
    }
}

impl IdentityResolver for MapDirectory {
    fn resolve_user(&self, name: &str) -> Option<Identity> {
        self.users.get(name).cloned()
    }
}

/// Permission backend granting fixed roles per user name
#[derive(Default)]
pub struct RolePermissions {
    grants: AHashSet<(String, Permission)>,
}

impl RolePermissions {
    pub fn grant(mut self, name: &str, permission: Permission) -> Self {
        self.grants.insert((name.to_string(), permission));
        self
    }
}

impl PermissionBackend for RolePermissions {
    fn has_permission(&self, identity: &Identity, permission: Permission, qualifier: &str) -> bool {
        match permission {
            Permission::Everyone => true,
            Permission::UserSpecific => identity.name.eq_ignore_ascii_case(qualifier),
            _ => self.grants.contains(&(identity.name.clone(), permission)),
        }
    }
}

/// A bot wired to recording sinks
pub struct Harness {
    pub bot: Bot,
    pub errors: Arc<RecordingErrors>,
    pub replies: Arc<RecordingReplies>,
}

impl Harness {
    pub fn new(settings: Settings) -> Self {
        Self::with_hosts(settings, MapDirectory::default(), RolePermissions::default())
    }

    pub fn with_hosts(
        settings: Settings,
        directory: MapDirectory,
        permissions: RolePermissions,
    ) -> Self {
        let errors = Arc::new(RecordingErrors::default());
        let replies = Arc::new(RecordingReplies::default());
        let bot = Bot::new(settings)
            .with_identities(Arc::new(directory))
            .with_permissions(Arc::new(permissions))
            .with_error_sink(errors.clone())
            .with_reply_sink(replies.clone());
        Self {
            bot,
            errors,
            replies,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// A public Twitch message from `name` at `secs`
pub fn message_at(name: &str, content: &str, secs: f64) -> ChatMessage {
    ChatMessage::new(
        Identity::new(format!("id-{}", name), name),
        content,
        Channel::public(Platform::Twitch),
        Duration::from_secs_f64(secs),
    )
}

pub fn message(name: &str, content: &str) -> ChatMessage {
    message_at(name, content, 0.0)
}

pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}
