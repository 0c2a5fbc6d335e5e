//! Error types for the command system
//!
//! Two families live here:
//!
//! - [`CommandError`] - a single invocation went wrong (bad input, failed
//!   authorization, rate limiting, or a failure inside user code). These are
//!   routed to the host's error sink, never raised to the message source.
//! - [`RegistrationError`] - a command, group or node could not be added to
//!   the tree. These are returned synchronously to the caller of `register`.
//!
//! User code (command bodies, checks, converters, listeners) returns
//! `anyhow::Result`. [`CommandError::from_user`] passes a `CommandError`
//! through untouched and wraps anything else as
//! [`CommandError::ExceptionCaught`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use chatbot_settings::SettingsError;
use thiserror::Error;

use crate::cooldown::BucketScope;

/// Result type for a single invocation
pub type CmdResult<T = ()> = Result<T, CommandError>;

/// Result type for tree mutations
pub type RegResult<T = ()> = Result<T, RegistrationError>;

/// Errors raised while resolving or running one invocation
#[derive(Debug, Error)]
pub enum CommandError {
    // =========================================================================
    // Input
    // =========================================================================
    /// A quote character appeared inside an unquoted word
    #[error("unexpected quote mark '{quote}' in non-quoted string at position {position}")]
    UnexpectedQuote { quote: char, position: usize },

    /// Input ended before the closing quote
    #[error("expected closing {expected}")]
    UnterminatedQuote { expected: char, position: usize },

    /// A closing quote was followed by something other than whitespace
    #[error("expected space after closing quotation but received '{found}'")]
    InvalidEndOfQuotedString { found: char, position: usize },

    /// A converter rejected its input
    #[error("converting to \"{type_name}\" failed for parameter \"{parameter}\": {source}")]
    Conversion {
        parameter: String,
        type_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Free-form rejection raised by user code
    #[error("{0}")]
    BadArgument(String),

    /// Every candidate of a union parameter rejected the token
    #[error("could not convert \"{argument}\" for parameter \"{parameter}\" into {}", .types.join(", "))]
    BadUnionArgument {
        parameter: String,
        types: Vec<String>,
        argument: String,
    },

    /// A required parameter had no input left
    #[error("{parameter} is a required argument that is missing")]
    MissingArguments { command: String, parameter: String },

    /// Trailing input on a command that does not ignore extra arguments
    #[error("too many arguments passed to {command}")]
    TooManyArguments { command: String },

    // =========================================================================
    // Authorization and rate limiting
    // =========================================================================
    /// One or more checks evaluated to false
    #[error("the check functions for command {command} failed: {}", .failed.join(", "))]
    ChecksFailed { command: String, failed: Vec<String> },

    /// A cooldown bucket is exhausted
    #[error("command {command} is on cooldown, try again in {:.2}s", .retry_after.as_secs_f64())]
    OnCooldown {
        command: String,
        scope: BucketScope,
        retry_after: Duration,
    },

    // =========================================================================
    // Resolution and runtime
    // =========================================================================
    /// No command is registered under the given name
    #[error("command \"{0}\" is not found")]
    NoCommandFound(String),

    /// User code failed with something other than a `CommandError`
    #[error("{context} raised an exception: {source}")]
    ExceptionCaught {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CommandError {
    /// Create a bad-argument error from user code
    pub fn bad_argument(message: impl Into<String>) -> Self {
        CommandError::BadArgument(message.into())
    }

    /// Map a failure from user code into the taxonomy
    ///
    /// A `CommandError` carried inside the `anyhow::Error` is returned as is;
    /// anything else becomes `ExceptionCaught` tagged with `context`.
    pub fn from_user(context: impl Into<String>, error: anyhow::Error) -> Self {
        match error.downcast::<CommandError>() {
            Ok(err) => err,
            Err(source) => CommandError::ExceptionCaught {
                context: context.into(),
                source,
            },
        }
    }

    /// Run user code, turning both errors and panics into a `CommandError`
    pub fn guard<T>(
        context: impl Into<String>,
        f: impl FnOnce() -> anyhow::Result<T>,
    ) -> CmdResult<T> {
        let context = context.into();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CommandError::from_user(context, error)),
            Err(payload) => Err(CommandError::ExceptionCaught {
                source: anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
                context,
            }),
        }
    }

    /// Whether the user typed something the command could not accept
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            CommandError::UnexpectedQuote { .. }
                | CommandError::UnterminatedQuote { .. }
                | CommandError::InvalidEndOfQuotedString { .. }
                | CommandError::Conversion { .. }
                | CommandError::BadArgument(_)
                | CommandError::BadUnionArgument { .. }
                | CommandError::MissingArguments { .. }
                | CommandError::TooManyArguments { .. }
        )
    }

    /// Whether the error came from the quote-aware tokenizer
    pub fn is_quote_error(&self) -> bool {
        matches!(
            self,
            CommandError::UnexpectedQuote { .. }
                | CommandError::UnterminatedQuote { .. }
                | CommandError::InvalidEndOfQuotedString { .. }
        )
    }

    /// Per-user cooldown rejection
    pub fn is_user_cooldown(&self) -> bool {
        matches!(
            self,
            CommandError::OnCooldown {
                scope: BucketScope::User,
                ..
            }
        )
    }

    /// Global cooldown rejection
    pub fn is_global_cooldown(&self) -> bool {
        matches!(
            self,
            CommandError::OnCooldown {
                scope: BucketScope::Global,
                ..
            }
        )
    }

    /// Time until a cooldown admits the caller again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CommandError::OnCooldown { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Errors raised while mutating the command tree
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A command with this name already exists in the collection
    #[error("command {0} is already registered")]
    DuplicateCommand(String),

    /// An alias collides with an existing name or alias
    #[error("the alias {alias} for {command} is already an existing command or alias")]
    DuplicateAlias { command: String, alias: String },

    /// A node brought a name that is already taken
    #[error("node {node} defines {name}, which already exists")]
    CommandExists { node: String, name: String },

    /// A node with this name is already installed
    #[error("node {0} is already installed")]
    DuplicateNode(String),

    /// Names must be non-empty and free of whitespace
    #[error("invalid command name \"{0}\"")]
    InvalidName(String),

    /// A rest-of-input parameter must be the last one
    #[error("parameter {parameter} of {command} consumes the rest of input but is not last")]
    RestOfInputNotLast { command: String, parameter: String },

    /// Two parameters share a name
    #[error("parameter {parameter} of {command} is declared twice")]
    DuplicateParameter { command: String, parameter: String },

    /// A union parameter lists no types
    #[error("parameter {parameter} of {command} is a union of no types")]
    EmptyUnion { command: String, parameter: String },

    /// A parameter names a converter that is not registered
    #[error("parameter {parameter} of {command} uses unknown type \"{type_name}\"")]
    UnknownConverter {
        command: String,
        parameter: String,
        type_name: String,
    },

    /// A converter with this type name already exists
    #[error("converter \"{0}\" is already registered")]
    DuplicateConverter(String),

    /// Cooldown rate and window must both be positive
    #[error("invalid cooldown on {command}: {reason}")]
    InvalidCooldown { command: String, reason: String },

    /// A command takes its name from a missing or non-text setting
    #[error("command name setting {key} is unavailable: {source}")]
    UnknownSetting {
        key: String,
        #[source]
        source: SettingsError,
    },

    /// A settings payload could not be applied
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// No node is installed under this name
    #[error("node {0} was not found")]
    UnknownNode(String),

    /// No command exists at this qualified path
    #[error("no command at \"{0}\"")]
    UnknownCommand(String),

    /// Subcommands can only be attached to groups
    #[error("{0} is not a group")]
    NotAGroup(String),
}
