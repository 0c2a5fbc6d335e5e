//! Host collaborators
//!
//! The engine never talks to a chat service, a user database or a UI
//! directly. Everything outside the dispatch core is reached through the
//! traits in this module, supplied by the host when building a
//! [`Bot`](crate::Bot).

use crate::checks::Permission;
use crate::error::CommandError;
use crate::invocation::{Channel, Identity, Invocation, Platform};

/// Looks up chat users by name
pub trait IdentityResolver: Send + Sync {
    /// Resolve a (lowercased) user name to an identity
    fn resolve_user(&self, name: &str) -> Option<Identity>;
}

/// Answers permission questions about a user
pub trait PermissionBackend: Send + Sync {
    /// Whether `identity` holds `permission`
    ///
    /// `qualifier` carries the permission's parameter: a user name for
    /// [`Permission::UserSpecific`], a number for the `Min*` kinds, empty
    /// otherwise.
    fn has_permission(&self, identity: &Identity, permission: Permission, qualifier: &str) -> bool;
}

/// Receives failed invocations and other reported errors
pub trait ErrorSink: Send + Sync {
    /// A command failed after its target was resolved
    fn report_command_error(&self, invocation: &Invocation, error: &CommandError);

    /// A failure outside any command: listeners, scheduled events,
    /// direct invocations of unknown paths
    fn report_error(&self, error: &CommandError);
}

/// Delivers outgoing chat text
pub trait ReplySink: Send + Sync {
    fn send(&self, channel: Channel, text: &str);
}

// =============================================================================
// Defaults
// =============================================================================

/// Directory that knows nobody
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdentities;

impl IdentityResolver for NoIdentities {
    fn resolve_user(&self, _name: &str) -> Option<Identity> {
        None
    }
}

/// Grants only [`Permission::Everyone`]
#[derive(Debug, Default, Clone, Copy)]
pub struct EveryoneOnly;

impl PermissionBackend for EveryoneOnly {
    fn has_permission(&self, _identity: &Identity, permission: Permission, _qualifier: &str) -> bool {
        permission == Permission::Everyone
    }
}

/// Writes reported errors to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report_command_error(&self, invocation: &Invocation, error: &CommandError) {
        if error.is_user_input() {
            log::info!(
                "{} ({}): {}",
                invocation.command,
                invocation.author().name,
                error
            );
        } else {
            log::warn!(
                "{} ({}): {}",
                invocation.command,
                invocation.author().name,
                error
            );
        }
    }

    fn report_error(&self, error: &CommandError) {
        log::error!("{}", error);
    }
}

/// Writes outgoing chat text to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReplySink;

impl ReplySink for LogReplySink {
    fn send(&self, channel: Channel, text: &str) {
        let target = if channel.whisper { "whisper" } else { "chat" };
        log::info!("[{} {}] {}", channel.platform, target, text);
    }
}

/// Apply the platform's highlight convention to a reply
///
/// Twitch renders `/me` lines in the sender's colour; other services have no
/// equivalent and get the text unchanged.
pub fn highlight(platform: Platform, text: &str) -> String {
    match platform {
        Platform::Twitch => format!("/me {}", text),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight() {
        assert_eq!(highlight(Platform::Twitch, "hi"), "/me hi");
        assert_eq!(highlight(Platform::Discord, "hi"), "hi");
    }

    #[test]
    fn test_defaults() {
        let who = Identity::new("1", "a");
        assert!(NoIdentities.resolve_user("a").is_none());
        assert!(EveryoneOnly.has_permission(&who, Permission::Everyone, ""));
        assert!(!EveryoneOnly.has_permission(&who, Permission::Moderator, ""));
    }
}
