//! Message dispatch
//!
//! One invocation moves through these stages:
//!
//! ```text
//! Resolving -> Checking -> CoolingDown -> ResolvingParameters -> Invoking -> Done
//!     |            |            |                  |                 |
//!     +-- not a command / not found (ignored)      +----- Failed ----+
//! ```
//!
//! Resolution happens before any user code runs; an unknown command is not
//! an error and is only logged. Every later failure is reported to the
//! error sink exactly once and ends the invocation.

use std::fmt;

use chatbot_settings::Settings;

use crate::checks::{self, CheckContext};
use crate::command::CommandContext;
use crate::converters::ConvertContext;
use crate::cooldown;
use crate::error::{CmdResult, CommandError};
use crate::host::{ErrorSink, IdentityResolver, PermissionBackend};
use crate::invocation::{ChatMessage, Invocation};
use crate::params;
use crate::registry::CommandMap;
use crate::scheduler::Outbox;
use crate::view::TokenView;

/// Where an invocation is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Checking,
    CoolingDown,
    ResolvingParameters,
    Invoking,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Resolving => "resolving",
            Stage::Checking => "checking",
            Stage::CoolingDown => "cooling down",
            Stage::ResolvingParameters => "resolving parameters",
            Stage::Invoking => "invoking",
        })
    }
}

/// How dispatch of one message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No prefix matched, or nothing followed it
    NotCommand,
    /// Nothing is registered under the typed name
    NotFound { name: String },
    /// The body ran to completion
    Completed { command: String },
    /// A stage failed; the error went to the error sink
    Failed { command: String, stage: Stage },
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }

    /// Qualified name of the command that ran, if any got that far
    pub fn command(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Completed { command } | DispatchOutcome::Failed { command, .. } => {
                Some(command)
            }
            _ => None,
        }
    }
}

/// Borrowed view of the bot used for one dispatch
pub struct Dispatcher<'a> {
    pub commands: &'a mut CommandMap,
    pub settings: &'a Settings,
    pub identities: &'a dyn IdentityResolver,
    pub permissions: &'a dyn PermissionBackend,
    pub errors: &'a dyn ErrorSink,
    pub outbox: &'a mut Outbox,
}

impl Dispatcher<'_> {
    /// Resolve and run the command named in `message`
    pub fn dispatch(&mut self, message: ChatMessage) -> DispatchOutcome {
        let Some(prefix) = self.settings.match_prefix(&message.content).map(str::to_string) else {
            return DispatchOutcome::NotCommand;
        };

        let mut view = TokenView::new(message.content.clone());
        view.skip_string(&prefix);
        let word = match view.read_word() {
            Some(word) if !word.is_empty() => word,
            _ => return DispatchOutcome::NotCommand,
        };

        let Some(resolution) = self.commands.resolve(&word, &mut view) else {
            log::debug!("no command found as {}", word);
            return DispatchOutcome::NotFound { name: word };
        };
        let qualified = resolution.qualified_name();

        if resolution.fell_through {
            let runs_anyway = self
                .commands
                .get_path(&qualified)
                .and_then(|c| c.group())
                .map_or(true, |g| g.dispatch_without_command());
            if !runs_anyway {
                let next = view.remaining().split_whitespace().next().unwrap_or("");
                log::debug!("{} has no subcommand {}", qualified, next);
                return DispatchOutcome::NotFound {
                    name: format!("{} {}", qualified, next),
                };
            }
        }

        let mut invocation = Invocation::new(message, prefix, qualified, word, view);
        self.execute(&resolution.path, &mut invocation, true)
    }

    /// Run the command at `path` with `text` as its argument input
    ///
    /// With `enforce` off, checks and cooldowns are skipped.
    pub fn invoke(
        &mut self,
        path: &str,
        text: &str,
        message: ChatMessage,
        enforce: bool,
    ) -> DispatchOutcome {
        let Some(names) = self.commands.canonical_path(path) else {
            let error = CommandError::NoCommandFound(path.to_string());
            log::debug!("{}", error);
            self.errors.report_error(&error);
            return DispatchOutcome::NotFound {
                name: path.to_string(),
            };
        };
        let qualified = names.join(" ");
        let mut invocation = Invocation::new(message, "", qualified, path, TokenView::new(text));
        self.execute(&names, &mut invocation, enforce)
    }

    fn execute(&mut self, path: &[String], invocation: &mut Invocation, enforce: bool) -> DispatchOutcome {
        let mut stage = Stage::Resolving;
        match self.run_stages(path, invocation, enforce, &mut stage) {
            Ok(()) => {
                log::debug!("{} completed", invocation.command);
                DispatchOutcome::Completed {
                    command: invocation.command.clone(),
                }
            }
            Err(error) => {
                log::debug!("{} failed while {}: {}", invocation.command, stage, error);
                self.errors.report_command_error(invocation, &error);
                DispatchOutcome::Failed {
                    command: invocation.command.clone(),
                    stage,
                }
            }
        }
    }

    fn run_stages(
        &mut self,
        path: &[String],
        invocation: &mut Invocation,
        enforce: bool,
        stage: &mut Stage,
    ) -> CmdResult<()> {
        let command = self
            .commands
            .get_path_mut(path)
            .ok_or_else(|| CommandError::NoCommandFound(invocation.command.clone()))?;

        if enforce {
            *stage = Stage::Checking;
            let ctx = CheckContext {
                message: &invocation.message,
                command: &invocation.command,
                permissions: self.permissions,
                settings: self.settings,
            };
            checks::run_checks(
                command.checks(),
                &ctx,
                command.flag_failures(invocation.channel()),
            )?;

            *stage = Stage::CoolingDown;
            cooldown::apply_cooldowns(
                &invocation.command,
                command.cooldowns_mut(),
                &invocation.message.author.id,
                invocation.message.timestamp,
            )?;
        }

        *stage = Stage::ResolvingParameters;
        let ctx = ConvertContext {
            message: &invocation.message,
            command: &invocation.command,
            identities: self.identities,
        };
        invocation.args = params::resolve_parameters(
            command.params(),
            command.ignore_extra(),
            &mut invocation.view,
            &ctx,
        )?;

        *stage = Stage::Invoking;
        let invocation: &Invocation = invocation;
        if let Some(hook) = command.pre_invoke() {
            if let Err(err) = CommandError::guard("pre-invoke hook", || hook(invocation)) {
                log::warn!("{}: {}", invocation.command, err);
            }
        }

        let mut ctx = CommandContext::new(invocation, &mut *self.outbox);
        let handler = command.handler();
        CommandError::guard(invocation.command.as_str(), || {
            handler.call(&mut ctx, &invocation.args)
        })?;

        if let Some(hook) = command.post_invoke() {
            if let Err(err) = CommandError::guard("post-invoke hook", || hook(invocation)) {
                log::warn!("{}: {}", invocation.command, err);
            }
        }
        Ok(())
    }
}
