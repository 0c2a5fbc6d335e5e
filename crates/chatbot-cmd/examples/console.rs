//! Interactive chat console
//!
//! Feeds lines typed at the prompt to a [`Bot`] as if they came from a chat
//! channel, and prints whatever the bot says back.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example console
//!
//! # With a settings file
//! cargo run --example console -- settings.json
//! ```
//!
//! ## Commands
//!
//! - `!echo some text` - Repeat the text
//! - `!roll [sides]` - Roll a die (user cooldown: twice per 10s)
//! - `!points` - Show your points
//! - `!points give bob 10` - Give points to another user
//! - `!later 3 hello` - Reply after 3 seconds
//! - `/as <name> <line>` - Send a line as another user
//! - `quit` or `exit` - Leave the console
//!
//! ## Command History
//!
//! - Up arrow: Previous line
//! - Down arrow: Next line

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chatbot_cmd::host::{ErrorSink, IdentityResolver, PermissionBackend, ReplySink};
use chatbot_cmd::prelude::*;
use chatbot_cmd::Invocation;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Users known to the console, with their point balances
#[derive(Default)]
struct Directory {
    points: Mutex<AHashMap<String, i64>>,
}

impl Directory {
    fn with_users(names: &[&str]) -> Self {
        let points = names.iter().map(|n| (n.to_string(), 100)).collect();
        Self {
            points: Mutex::new(points),
        }
    }

    fn balance(&self, name: &str) -> i64 {
        self.points.lock().get(name).copied().unwrap_or(0)
    }

    fn transfer(&self, from: &str, to: &str, amount: i64) -> anyhow::Result<()> {
        let mut points = self.points.lock();
        let have = points.get(from).copied().unwrap_or(0);
        if amount <= 0 || amount > have {
            anyhow::bail!("cannot give {} points with a balance of {}", amount, have);
        }
        *points.entry(from.to_string()).or_insert(0) -= amount;
        *points.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }
}

impl IdentityResolver for Directory {
    fn resolve_user(&self, name: &str) -> Option<Identity> {
        self.points
            .lock()
            .contains_key(name)
            .then(|| Identity::new(name, name))
    }
}

impl PermissionBackend for Directory {
    fn has_permission(&self, identity: &Identity, permission: Permission, _qualifier: &str) -> bool {
        match permission {
            Permission::Everyone => true,
            Permission::Moderator | Permission::Caster => identity.name == "admin",
            _ => false,
        }
    }
}

/// Prints chat output to stdout and failures to stderr
struct Terminal;

impl ReplySink for Terminal {
    fn send(&self, channel: Channel, text: &str) {
        if channel.whisper {
            println!("bot (whisper): {}", text);
        } else {
            println!("bot: {}", text);
        }
    }
}

impl ErrorSink for Terminal {
    fn report_command_error(&self, invocation: &Invocation, error: &CommandError) {
        eprintln!("Error in {}: {}", invocation.command, error);
    }

    fn report_error(&self, error: &CommandError) {
        eprintln!("Error: {}", error);
    }
}

fn register_commands(bot: &mut Bot, directory: &Arc<Directory>) -> Result<(), RegistrationError> {
    bot.register(
        CommandBuilder::new("echo")
            .alias("say")
            .help("Repeat the text back")
            .param(ParamDecl::rest("text", "str"))
            .handler(|ctx, args| {
                ctx.reply(args.get_str_or("text", ""));
                Ok(())
            }),
    )?;

    let rolls = Mutex::new(0x2545_f491_u64);
    bot.register(
        CommandBuilder::new("roll")
            .help("Roll a die")
            .param(ParamDecl::optional("sides", "int"))
            .user_cooldown(10.0, 2)
            .handler(move |ctx, args| {
                let sides = args.get_int_or("sides", 6);
                if sides < 1 {
                    return Err(CommandError::bad_argument("sides must be positive").into());
                }
                let mut seed = rolls.lock();
                *seed ^= *seed << 13;
                *seed ^= *seed >> 7;
                *seed ^= *seed << 17;
                let value = *seed % sides as u64 + 1;
                ctx.reply_with(&format!("rolled {} (d{})", value, sides), true, Duration::ZERO);
                Ok(())
            }),
    )?;

    let show = Arc::clone(directory);
    let give = Arc::clone(directory);
    bot.register(
        CommandBuilder::new("points")
            .help("Show or move points")
            .handler(move |ctx, _args| {
                let name = ctx.author().name.clone();
                ctx.reply(&format!("{} has {} points", name, show.balance(&name)));
                Ok(())
            })
            .subcommand(
                CommandBuilder::new("give")
                    .param(ParamDecl::required("user", "user"))
                    .param(ParamDecl::required("amount", "int"))
                    .handler(move |ctx, args| {
                        let from = ctx.author().name.clone();
                        let to = args
                            .get_user("user")
                            .map(|u| u.name.clone())
                            .unwrap_or_default();
                        let amount = args.get_int_or("amount", 0);
                        give.transfer(&from, &to, amount)?;
                        ctx.reply(&format!("{} gave {} points to {}", from, amount, to));
                        Ok(())
                    }),
            ),
    )?;

    bot.register(
        CommandBuilder::new("later")
            .help("Reply after a delay")
            .param(ParamDecl::required("seconds", "float"))
            .param(ParamDecl::rest("text", "str"))
            .handler(|ctx, args| {
                let seconds = args.get_float("seconds").unwrap_or(0.0).clamp(0.0, 600.0);
                ctx.reply_with(
                    args.get_str_or("text", ""),
                    false,
                    Duration::from_secs_f64(seconds),
                );
                Ok(())
            }),
    )?;

    bot.register(
        CommandBuilder::new("shutup")
            .help("Moderators only")
            .check(checks::moderator())
            .handler(|ctx, _args| {
                ctx.reply("ok");
                Ok(())
            }),
    )?;

    Ok(())
}

fn load_settings() -> Settings {
    let Some(path) = std::env::args().nth(1) else {
        return Settings::default();
    };
    match std::fs::read_to_string(&path).map_err(anyhow::Error::from).and_then(|text| {
        Settings::from_json(&text).map_err(anyhow::Error::from)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading {}: {}", path, e);
            Settings::default()
        }
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let directory = Arc::new(Directory::with_users(&["console", "admin", "bob"]));
    let terminal = Arc::new(Terminal);
    let mut bot = Bot::new(load_settings())
        .with_identities(directory.clone())
        .with_permissions(directory.clone())
        .with_error_sink(terminal.clone())
        .with_reply_sink(terminal);

    if let Err(e) = register_commands(&mut bot, &directory) {
        eprintln!("Error registering commands: {}", e);
        return;
    }
    bot.init();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error creating line editor: {}", e);
            return;
        }
    };

    println!();
    println!("=== Chat Command Console ===");
    println!();
    println!("Type chat lines at the prompt. Examples:");
    println!("  !echo hello there      - Repeat the text");
    println!("  !roll 20               - Roll a d20");
    println!("  !points give bob 10    - Give points");
    println!("  !later 3 hi            - Reply in 3 seconds");
    println!("  /as admin !shutup      - Speak as another user");
    println!("  quit / exit            - Leave");
    println!();

    let started = Instant::now();
    let console = Identity::new("console", "console");
    loop {
        let now = started.elapsed();
        bot.tick(now);

        match rl.readline("chat> ") {
            Ok(line) => {
                let line = line.trim();
                if line == "quit" || line == "exit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let now = started.elapsed();
                let message =
                    ChatMessage::new(console.clone(), line, Channel::public(Platform::Twitch), now);
                let outcome = match line.strip_prefix("/as ").and_then(|r| r.split_once(' ')) {
                    Some((name, rest)) => bot.invoke_as(
                        Identity::new(name, name),
                        ChatMessage { content: rest.to_string(), ..message },
                    ),
                    None => bot.handle_message(message),
                };
                log::debug!("{:?}", outcome);
                if let DispatchOutcome::NotFound { name } = outcome {
                    println!("(no command {})", name);
                }
                bot.tick(now);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                log::info!("EOF/interrupt received, exiting...");
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    bot.unload();
}
