//! Chat Bot Command System
//!
//! This crate turns lines of chat text into command invocations: it finds
//! the command a message names, checks the author may run it, enforces rate
//! limits, converts the arguments and runs the body.
//!
//! # Overview
//!
//! - Prefix matching and quote-aware tokenizing (`"two words"` is one argument)
//! - Typed parameters: required, optional, unions and rest-of-input
//! - Nested command groups with aliases
//! - Named authorization checks and per-user or global cooldowns
//! - Deferred replies and events drained by the host's tick
//! - Nodes: bundles of commands and listeners installed together
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use chatbot_cmd::prelude::*;
//!
//! let mut bot = Bot::default();
//! bot.register(
//!     CommandBuilder::new("echo")
//!         .param(ParamDecl::rest("text", "str"))
//!         .handler(|ctx, args| {
//!             ctx.reply(args.get_str_or("text", ""));
//!             Ok(())
//!         }),
//! )
//! .unwrap();
//!
//! let message = ChatMessage::new(
//!     Identity::new("1", "alice"),
//!     "!echo hello there",
//!     Channel::public(Platform::Twitch),
//!     Duration::ZERO,
//! );
//! assert!(bot.dispatch(message).is_completed());
//! ```
//!
//! # Architecture
//!
//! - **TokenView**: cursor over one message with single-step undo
//! - **Converters**: turn raw tokens into typed [`ArgValue`]s
//! - **CommandBuilder / Command**: declaration and registered record
//! - **CommandMap**: one level of the command tree, names plus aliases
//! - **Dispatcher**: runs one message through resolve, check, cooldown,
//!   parameter and invoke stages
//! - **Bot**: owns the tree, settings, listeners and scheduled queue
//! - **host**: traits the embedding application implements

mod args;
mod bot;
pub mod checks;
mod command;
mod converters;
mod cooldown;
mod dispatcher;
mod error;
mod events;
pub mod host;
mod invocation;
mod params;
mod registry;
mod scheduler;
mod view;

// Re-export main types
pub use args::{ArgValue, Arguments};
pub use bot::Bot;
pub use checks::{Check, CheckContext, Permission};
pub use command::{
    name_from_settings, validate_name, BuildEnv, Command, CommandBuilder, CommandContext,
    CommandFlags, CommandKind, Group, Handler, Hook, NameSource, Node, NodeInfo, DEFAULT_HELP,
    SETTINGS_NAME_PREFIX,
};
pub use converters::{
    parse_bool, BoolConverter, ConvertContext, Converter, ConverterRef, ConverterRegistry,
    FloatConverter, FnConverter, IntConverter, StrConverter, UserConverter, FALSE_WORDS,
    TRUE_WORDS,
};
pub use cooldown::{apply_cooldowns, BucketScope, Cooldown, CooldownBucket, CooldownMapping};
pub use dispatcher::{DispatchOutcome, Dispatcher, Stage};
pub use error::{CmdResult, CommandError, RegResult, RegistrationError};
pub use events::{ErrorHook, Event, EventBus, EventKind, Listener};
pub use host::{ErrorSink, IdentityResolver, PermissionBackend, ReplySink};
pub use invocation::{Channel, ChatMessage, Identity, Invocation, Platform};
pub use params::{bind_parameters, resolve_parameters, ParamDecl, ParamKind, Parameter};
pub use registry::{CommandMap, Removed, Resolution};
pub use scheduler::{Delivery, Outbox, Scheduled, ScheduledQueue};
pub use view::{TokenView, QUOTE_PAIRS};

pub use chatbot_settings::{Settings, SettingsError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::args::{ArgValue, Arguments};
    pub use crate::bot::Bot;
    pub use crate::checks::{self, Check, Permission};
    pub use crate::command::{CommandBuilder, CommandContext, Node};
    pub use crate::dispatcher::DispatchOutcome;
    pub use crate::error::{CmdResult, CommandError, RegistrationError};
    pub use crate::events::{Event, EventKind};
    pub use crate::invocation::{Channel, ChatMessage, Identity, Platform};
    pub use crate::params::ParamDecl;
    pub use chatbot_settings::Settings;
}
