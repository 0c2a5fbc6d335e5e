//! Authorization checks
//!
//! A [`Check`] is a named predicate over the invocation. All checks of a
//! command are evaluated in declaration order; a check that returns `false`
//! is recorded and evaluation continues, so the resulting
//! [`CommandError::ChecksFailed`] lists every failing check. A check that
//! returns an error stops evaluation immediately.
//!
//! The constructors at the bottom of this module build the usual permission
//! checks on top of the host's [`PermissionBackend`].

use std::fmt;

use chatbot_settings::Settings;
use serde::{Deserialize, Serialize};

use crate::error::{CmdResult, CommandError};
use crate::host::PermissionBackend;
use crate::invocation::{ChatMessage, Platform};

/// Permission kinds understood by the host's backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Everyone,
    Regular,
    Subscriber,
    #[serde(rename = "VIP")]
    Vip,
    Moderator,
    Editor,
    Caster,
    #[serde(rename = "User_Specific")]
    UserSpecific,
    #[serde(rename = "Min_Rank")]
    MinRank,
    #[serde(rename = "Min_Points")]
    MinPoints,
    #[serde(rename = "Min_Hours")]
    MinHours,
}

impl Permission {
    /// Name used by hosts and settings files
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Everyone => "Everyone",
            Permission::Regular => "Regular",
            Permission::Subscriber => "Subscriber",
            Permission::Vip => "VIP",
            Permission::Moderator => "Moderator",
            Permission::Editor => "Editor",
            Permission::Caster => "Caster",
            Permission::UserSpecific => "User_Specific",
            Permission::MinRank => "Min_Rank",
            Permission::MinPoints => "Min_Points",
            Permission::MinHours => "Min_Hours",
        }
    }

    /// Parse a host permission name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        const ALL: [Permission; 11] = [
            Permission::Everyone,
            Permission::Regular,
            Permission::Subscriber,
            Permission::Vip,
            Permission::Moderator,
            Permission::Editor,
            Permission::Caster,
            Permission::UserSpecific,
            Permission::MinRank,
            Permission::MinPoints,
            Permission::MinHours,
        ];
        ALL.into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a check can see
pub struct CheckContext<'a> {
    pub message: &'a ChatMessage,
    /// Qualified name of the command being checked
    pub command: &'a str,
    pub permissions: &'a dyn PermissionBackend,
    pub settings: &'a Settings,
}

impl CheckContext<'_> {
    /// Ask the host whether the author holds `permission`
    pub fn has_permission(&self, permission: Permission, qualifier: &str) -> bool {
        self.permissions
            .has_permission(&self.message.author, permission, qualifier)
    }
}

type Predicate = Box<dyn Fn(&CheckContext<'_>) -> anyhow::Result<bool> + Send + Sync>;

/// A named predicate guarding a command
pub struct Check {
    name: String,
    predicate: Predicate,
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

impl Check {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CheckContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the predicate; failures other than `CommandError` are wrapped
    pub fn evaluate(&self, ctx: &CheckContext<'_>) -> CmdResult<bool> {
        let context = format!("{} check {}", ctx.command, self.name);
        CommandError::guard(context, || (self.predicate)(ctx))
    }
}

/// Evaluate checks, collecting every `false` into `failed`
///
/// `failed` may arrive non-empty (implicit checks evaluated by the caller).
pub fn run_checks(
    checks: &[Check],
    ctx: &CheckContext<'_>,
    mut failed: Vec<String>,
) -> CmdResult<()> {
    for check in checks {
        if !check.evaluate(ctx)? {
            log::debug!("{}: check {} failed", ctx.command, check.name());
            failed.push(check.name().to_string());
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CommandError::ChecksFailed {
            command: ctx.command.to_string(),
            failed,
        })
    }
}

// =============================================================================
// Built-in Checks
// =============================================================================

fn permission_check(name: &str, permission: Permission, qualifier: String) -> Check {
    Check::new(name, move |ctx| Ok(ctx.has_permission(permission, &qualifier)))
}

pub fn moderator() -> Check {
    permission_check("moderator", Permission::Moderator, String::new())
}

pub fn subscriber() -> Check {
    permission_check("subscriber", Permission::Subscriber, String::new())
}

pub fn vip() -> Check {
    permission_check("vip", Permission::Vip, String::new())
}

pub fn editor() -> Check {
    permission_check("editor", Permission::Editor, String::new())
}

pub fn regular() -> Check {
    permission_check("regular", Permission::Regular, String::new())
}

pub fn caster() -> Check {
    permission_check("caster", Permission::Caster, String::new())
}

/// Only the named user may run the command
pub fn specific_user(name: impl Into<String>) -> Check {
    permission_check("specific_user", Permission::UserSpecific, name.into())
}

pub fn min_rank(rank: i64) -> Check {
    permission_check("min_rank", Permission::MinRank, rank.to_string())
}

pub fn min_points(points: i64) -> Check {
    permission_check("min_points", Permission::MinPoints, points.to_string())
}

pub fn min_hours(hours: f64) -> Check {
    permission_check("min_hours", Permission::MinHours, hours.to_string())
}

/// Only from a streaming service
pub fn stream_only() -> Check {
    Check::new("stream_only", |ctx| {
        Ok(ctx.message.channel.platform.is_stream_service())
    })
}

/// Only from Discord
pub fn discord_only() -> Check {
    Check::new("discord_only", |ctx| {
        Ok(ctx.message.channel.platform == Platform::Discord)
    })
}

/// Permission read from settings at check time
///
/// `key` names the permission kind (for example `"Moderator"`) and
/// `key_info` its qualifier. A missing or unknown kind is an error, which
/// surfaces as `ExceptionCaught` rather than a plain denial.
pub fn settings_permission(key: impl Into<String>) -> Check {
    let key = key.into();
    let name = format!("settings_permission({})", key);
    Check::new(name, move |ctx| {
        let kind = ctx.settings.require_str(&key)?;
        let permission = Permission::parse(kind)
            .ok_or_else(|| anyhow::anyhow!("{} names unknown permission \"{}\"", key, kind))?;
        let qualifier = ctx
            .settings
            .get_text(&format!("{}_info", key))
            .unwrap_or_default();
        Ok(ctx.has_permission(permission, &qualifier))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Channel, Identity};
    use std::time::Duration;

    struct Mods;

    impl PermissionBackend for Mods {
        fn has_permission(&self, identity: &crate::invocation::Identity, permission: Permission, qualifier: &str) -> bool {
            match permission {
                Permission::Everyone => true,
                Permission::Moderator => identity.name == "mod",
                Permission::MinPoints => qualifier.parse::<i64>().map_or(false, |n| n <= 100),
                _ => false,
            }
        }
    }

    fn message(author: &str, platform: Platform) -> ChatMessage {
        ChatMessage::new(Identity::new("1", author), "!x", Channel::public(platform), Duration::ZERO)
    }

    fn check(c: &Check, msg: &ChatMessage, settings: &Settings) -> CmdResult<bool> {
        let ctx = CheckContext {
            message: msg,
            command: "x",
            permissions: &Mods,
            settings,
        };
        c.evaluate(&ctx)
    }

    #[test]
    fn test_permission_checks() {
        let settings = Settings::new();
        let modmsg = message("mod", Platform::Twitch);
        let user = message("pleb", Platform::Twitch);
        assert!(check(&moderator(), &modmsg, &settings).unwrap());
        assert!(!check(&moderator(), &user, &settings).unwrap());
        assert!(check(&min_points(50), &user, &settings).unwrap());
        assert!(!check(&min_points(500), &user, &settings).unwrap());
    }

    #[test]
    fn test_platform_checks() {
        let settings = Settings::new();
        let twitch = message("a", Platform::Twitch);
        let discord = message("a", Platform::Discord);
        assert!(check(&stream_only(), &twitch, &settings).unwrap());
        assert!(!check(&stream_only(), &discord, &settings).unwrap());
        assert!(check(&discord_only(), &discord, &settings).unwrap());
    }

    #[test]
    fn test_run_checks_is_fail_slow() {
        let settings = Settings::new();
        let msg = message("pleb", Platform::Twitch);
        let ctx = CheckContext {
            message: &msg,
            command: "x",
            permissions: &Mods,
            settings: &settings,
        };
        let checks = vec![moderator(), Check::new("always", |_| Ok(true)), caster()];
        match run_checks(&checks, &ctx, Vec::new()).unwrap_err() {
            CommandError::ChecksFailed { failed, .. } => assert_eq!(failed, ["moderator", "caster"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_run_checks_stops_on_error() {
        let settings = Settings::new();
        let msg = message("pleb", Platform::Twitch);
        let ctx = CheckContext {
            message: &msg,
            command: "points give",
            permissions: &Mods,
            settings: &settings,
        };
        let checks = vec![
            Check::new("broken", |_| Err(anyhow::anyhow!("db down"))),
            Check::new("never", |_| panic!("must not run")),
        ];
        match run_checks(&checks, &ctx, Vec::new()).unwrap_err() {
            CommandError::ExceptionCaught { context, .. } => assert_eq!(context, "points give check broken"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_check_may_raise_command_error() {
        let settings = Settings::new();
        let msg = message("pleb", Platform::Twitch);
        let c = Check::new("picky", |_| Err(CommandError::bad_argument("no").into()));
        assert!(matches!(check(&c, &msg, &settings), Err(CommandError::BadArgument(_))));
    }

    #[test]
    fn test_settings_permission() {
        let mut settings = Settings::new();
        settings.set("give_perm", "Min_Points");
        settings.set("give_perm_info", 10);
        let msg = message("pleb", Platform::Twitch);
        let c = settings_permission("give_perm");
        assert!(check(&c, &msg, &settings).unwrap());

        settings.set("give_perm", "Moderator");
        assert!(!check(&c, &msg, &settings).unwrap());

        settings.set("give_perm", "Wizard");
        assert!(matches!(check(&c, &msg, &settings), Err(CommandError::ExceptionCaught { .. })));
    }

    #[test]
    fn test_permission_names() {
        assert_eq!(Permission::parse("vip"), Some(Permission::Vip));
        assert_eq!(Permission::parse("User_Specific"), Some(Permission::UserSpecific));
        assert_eq!(Permission::MinHours.to_string(), "Min_Hours");
        assert_eq!(Permission::parse("nope"), None);
    }
}
