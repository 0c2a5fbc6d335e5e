//! Command collections
//!
//! A [`CommandMap`] holds the commands of one level of the tree: the bot's
//! top level or the children of one group. Names and aliases share a single
//! namespace per map; lookups go through the name first and then the alias
//! table. A map may be case-insensitive, in which case keys are stored
//! lowercased.
//!
//! Qualified names are the space-separated path of canonical names from the
//! top level, e.g. `"tag add"`.

use ahash::{AHashMap, AHashSet};

use crate::command::{Command, CommandKind, NameSource};
use crate::error::{RegResult, RegistrationError};
use crate::view::TokenView;

/// Outcome of [`CommandMap::remove`]
#[derive(Debug)]
pub enum Removed {
    /// Only an alias was dropped
    Alias { alias: String, command: String },
    /// The command, its aliases and (for groups) its children were dropped
    Command(Command),
}

/// Target found by walking a group chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical names from the top level down to the target
    pub path: Vec<String>,
    /// The word after the target group named no subcommand
    pub fell_through: bool,
}

impl Resolution {
    pub fn qualified_name(&self) -> String {
        self.path.join(" ")
    }
}

/// Commands of one tree level, with their aliases
#[derive(Debug, Default)]
pub struct CommandMap {
    /// Commands indexed by (possibly lowercased) name
    commands: AHashMap<String, Command>,
    /// Aliases mapping alias key -> command key
    aliases: AHashMap<String, String>,
    case_insensitive: bool,
}

impl CommandMap {
    /// Create an empty map
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            commands: AHashMap::new(),
            aliases: AHashMap::new(),
            case_insensitive,
        }
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    fn taken(&self, key: &str) -> bool {
        self.commands.contains_key(key) || self.aliases.contains_key(key)
    }

    /// Verify `command` could be inserted without changing anything
    pub fn check_insert(&self, command: &Command) -> RegResult<()> {
        let key = self.key(command.name());
        if self.taken(&key) {
            return Err(RegistrationError::DuplicateCommand(command.name().to_string()));
        }
        let mut seen = AHashSet::new();
        seen.insert(key);
        for alias in command.aliases() {
            let alias_key = self.key(alias);
            if self.taken(&alias_key) || !seen.insert(alias_key) {
                return Err(RegistrationError::DuplicateAlias {
                    command: command.name().to_string(),
                    alias: alias.clone(),
                });
            }
        }
        Ok(())
    }

    /// Add a command; names and aliases must be free
    pub fn insert(&mut self, command: Command) -> RegResult<()> {
        self.check_insert(&command)?;
        let key = self.key(command.name());
        let alias_keys: Vec<String> = command.aliases().iter().map(|a| self.key(a)).collect();
        for alias_key in alias_keys {
            self.aliases.insert(alias_key, key.clone());
        }
        self.commands.insert(key, command);
        Ok(())
    }

    fn canonical_key(&self, name: &str) -> Option<String> {
        let key = self.key(name);
        if self.commands.contains_key(&key) {
            Some(key)
        } else {
            self.aliases.get(&key).cloned()
        }
    }

    /// Look up a command by name or alias
    pub fn get(&self, name: &str) -> Option<&Command> {
        let key = self.key(name);
        self.commands
            .get(&key)
            .or_else(|| self.aliases.get(&key).and_then(|k| self.commands.get(k)))
    }

    /// Look up a command by name or alias for mutation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Command> {
        let key = self.canonical_key(name)?;
        self.commands.get_mut(&key)
    }

    /// Check if a name or alias is taken
    pub fn contains(&self, name: &str) -> bool {
        self.taken(&self.key(name))
    }

    /// Remove a command or an alias
    ///
    /// Removing by alias drops only that alias. Removing by name drops the
    /// command together with all of its aliases and, for a group, every
    /// command beneath it.
    pub fn remove(&mut self, name: &str) -> Option<Removed> {
        let key = self.key(name);
        if let Some(command) = self.commands.remove(&key) {
            self.aliases.retain(|_, target| *target != key);
            return Some(Removed::Command(command));
        }
        let target = self.aliases.remove(&key)?;
        let case_insensitive = self.case_insensitive;
        if let Some(command) = self.commands.get_mut(&target) {
            command.aliases.retain(|a| {
                let k = if case_insensitive { a.to_lowercase() } else { a.clone() };
                k != key
            });
        }
        Some(Removed::Alias {
            alias: name.to_string(),
            command: target,
        })
    }

    /// Number of commands, not counting aliases
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands at this level, sorted by name
    pub fn commands(&self) -> Vec<&Command> {
        let mut commands: Vec<&Command> = self.commands.values().collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    /// Consume the map, yielding its commands
    pub fn into_commands(self) -> Vec<Command> {
        self.commands.into_iter().map(|(_, c)| c).collect()
    }

    pub(crate) fn commands_mut(&mut self) -> impl Iterator<Item = &mut Command> {
        self.commands.values_mut()
    }

    /// Get all command names (not including aliases)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.values().map(|c| c.name())
    }

    /// Every command in the tree with its qualified name, depth-first
    pub fn walk(&self) -> Vec<(String, &Command)> {
        let mut out = Vec::new();
        self.walk_into("", &mut out);
        out
    }

    fn walk_into<'a>(&'a self, parent: &str, out: &mut Vec<(String, &'a Command)>) {
        for command in self.commands() {
            let qualified = if parent.is_empty() {
                command.name().to_string()
            } else {
                format!("{} {}", parent, command.name())
            };
            if let Some(group) = command.group() {
                out.push((qualified.clone(), command));
                group.children.walk_into(&qualified, out);
            } else {
                out.push((qualified, command));
            }
        }
    }

    /// Canonical names along a space-separated path of names or aliases
    ///
    /// The walk stops early at a plain command; trailing words are ignored.
    pub fn canonical_path(&self, path: &str) -> Option<Vec<String>> {
        let mut segments = path.split_whitespace();
        let mut current = self.get(segments.next()?)?;
        let mut names = vec![current.name().to_string()];
        for segment in segments {
            let Some(group) = current.group() else {
                break;
            };
            current = group.children.get(segment)?;
            names.push(current.name().to_string());
        }
        Some(names)
    }

    /// Look up a command by qualified name
    pub fn get_path(&self, path: &str) -> Option<&Command> {
        let keys = self.canonical_path(path)?;
        self.get_keys(&keys)
    }

    fn get_keys<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Command> {
        let (first, rest) = keys.split_first()?;
        let command = self.get(first.as_ref())?;
        match (&command.kind, rest.is_empty()) {
            (CommandKind::Group(group), false) => group.children.get_keys(rest),
            _ => Some(command),
        }
    }

    /// Mutable lookup along a path of names
    pub fn get_path_mut<S: AsRef<str>>(&mut self, keys: &[S]) -> Option<&mut Command> {
        let (first, rest) = keys.split_first()?;
        let command = self.get_mut(first.as_ref())?;
        if rest.is_empty() || !command.is_group() {
            return Some(command);
        }
        match &mut command.kind {
            CommandKind::Group(group) => group.children.get_path_mut(rest),
            CommandKind::Leaf => None,
        }
    }

    /// Find the command named by `word`, descending into groups
    ///
    /// After `word` has been read from `view`, each further word that names
    /// a subcommand of the current group is consumed. At end of input the
    /// group itself is the target. An unknown word is pushed back and the
    /// group is the target with `fell_through` set.
    pub fn resolve(&self, word: &str, view: &mut TokenView) -> Option<Resolution> {
        let key = self.canonical_key(word)?;
        let mut current = self.commands.get(&key)?;
        let mut path = vec![current.name().to_string()];
        let mut fell_through = false;

        while let CommandKind::Group(group) = &current.kind {
            view.skip_whitespace();
            let Some(next) = view.read_word() else {
                break;
            };
            let child = group
                .children
                .canonical_key(&next)
                .and_then(|k| group.children.commands.get(&k));
            match child {
                Some(command) => {
                    current = command;
                    path.push(command.name().to_string());
                }
                None => {
                    view.undo();
                    fell_through = true;
                    break;
                }
            }
        }

        Some(Resolution { path, fell_through })
    }

    // =========================================================================
    // Settings-derived names
    // =========================================================================

    /// Check that renaming settings-named commands would leave no collisions
    pub fn check_rebind(&self, resolve: &dyn Fn(&str) -> RegResult<String>) -> RegResult<()> {
        let mut seen = AHashSet::new();
        for command in self.commands.values() {
            let name = match command.name_source() {
                NameSource::Setting(key) => resolve(key)?,
                NameSource::Literal => command.name().to_string(),
            };
            if !seen.insert(self.key(&name)) {
                return Err(RegistrationError::DuplicateCommand(name));
            }
        }
        for command in self.commands.values() {
            for alias in command.aliases() {
                if !seen.insert(self.key(alias)) {
                    return Err(RegistrationError::DuplicateAlias {
                        command: command.name().to_string(),
                        alias: alias.clone(),
                    });
                }
            }
            if let Some(group) = command.group() {
                group.children.check_rebind(resolve)?;
            }
        }
        Ok(())
    }

    /// Rename settings-named commands and re-key the map
    ///
    /// Call [`check_rebind`](Self::check_rebind) first; this assumes the
    /// new names are free.
    pub fn apply_rebind(&mut self, resolve: &dyn Fn(&str) -> RegResult<String>) -> RegResult<()> {
        let old = std::mem::take(&mut self.commands);
        self.aliases.clear();
        for (_, mut command) in old {
            if let NameSource::Setting(key) = command.name_source().clone() {
                let name = resolve(&key)?;
                if name != command.name {
                    log::info!("command {} renamed to {}", command.name, name);
                    command.name = name;
                }
            }
            if let Some(group) = command.group_mut() {
                group.children.apply_rebind(resolve)?;
            }
            self.insert(command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BuildEnv, CommandBuilder};
    use crate::converters::ConverterRegistry;
    use chatbot_settings::Settings;

    fn build(builder: CommandBuilder) -> Command {
        build_with(builder, &Settings::new())
    }

    fn build_with(builder: CommandBuilder, settings: &Settings) -> Command {
        let converters = ConverterRegistry::with_builtins();
        builder
            .build(&BuildEnv {
                converters: &converters,
                settings,
            })
            .unwrap()
    }

    fn tree() -> CommandMap {
        let mut map = CommandMap::new(false);
        map.insert(build(CommandBuilder::new("ping").alias("p"))).unwrap();
        map.insert(build(
            CommandBuilder::new("tag")
                .alias("t")
                .subcommand(CommandBuilder::new("add").alias("new"))
                .subcommand(
                    CommandBuilder::new("list").subcommand(CommandBuilder::new("all")),
                ),
        ))
        .unwrap();
        map
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let map = tree();
        assert_eq!(map.get("ping").unwrap().name(), "ping");
        assert_eq!(map.get("p").unwrap().name(), "ping");
        assert!(map.get("PING").is_none());
        assert!(map.contains("t"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_case_insensitive_map() {
        let mut map = CommandMap::new(true);
        map.insert(build(CommandBuilder::new("Ping").alias("P"))).unwrap();
        assert_eq!(map.get("PING").unwrap().name(), "Ping");
        assert_eq!(map.get("p").unwrap().name(), "Ping");
        assert!(map.insert(build(CommandBuilder::new("ping"))).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut map = tree();
        assert!(matches!(
            map.insert(build(CommandBuilder::new("ping"))),
            Err(RegistrationError::DuplicateCommand(_))
        ));
        assert!(matches!(
            map.insert(build(CommandBuilder::new("p"))),
            Err(RegistrationError::DuplicateCommand(_))
        ));
        assert!(matches!(
            map.insert(build(CommandBuilder::new("pong").alias("ping"))),
            Err(RegistrationError::DuplicateAlias { .. })
        ));
        assert!(matches!(
            map.insert(build(CommandBuilder::new("pong").alias("x").alias("x"))),
            Err(RegistrationError::DuplicateAlias { .. })
        ));
        assert!(!map.contains("pong"));
    }

    #[test]
    fn test_remove_alias_only() {
        let mut map = tree();
        match map.remove("p") {
            Some(Removed::Alias { alias, command }) => {
                assert_eq!(alias, "p");
                assert_eq!(command, "ping");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(map.get("p").is_none());
        assert!(map.get("ping").unwrap().aliases().is_empty());
    }

    #[test]
    fn test_remove_command_takes_aliases() {
        let mut map = tree();
        assert!(matches!(map.remove("tag"), Some(Removed::Command(_))));
        assert!(map.get("t").is_none());
        assert!(map.get_path("tag add").is_none());
        assert!(map.remove("tag").is_none());
    }

    #[test]
    fn test_qualified_paths() {
        let map = tree();
        assert_eq!(map.get_path("tag new").unwrap().name(), "add");
        assert_eq!(map.get_path("t list all").unwrap().name(), "all");
        assert_eq!(map.get_path("ping extra words").unwrap().name(), "ping");
        assert!(map.get_path("tag nope").is_none());
        assert_eq!(map.canonical_path("t new").unwrap(), ["tag", "add"]);
    }

    #[test]
    fn test_walk() {
        let map = tree();
        let names: Vec<String> = map.walk().into_iter().map(|(q, _)| q).collect();
        assert_eq!(names, ["ping", "tag", "tag add", "tag list", "tag list all"]);
    }

    fn resolve(map: &CommandMap, text: &str) -> (Option<Resolution>, TokenView) {
        let mut view = TokenView::new(text);
        let word = view.read_word().unwrap_or_default();
        (map.resolve(&word, &mut view), view)
    }

    #[test]
    fn test_resolve_descends_groups() {
        let map = tree();
        let (res, view) = resolve(&map, "tag list all rest");
        let res = res.unwrap();
        assert_eq!(res.qualified_name(), "tag list all");
        assert!(!res.fell_through);
        assert_eq!(view.remaining(), " rest");
    }

    #[test]
    fn test_resolve_bare_group() {
        let map = tree();
        let (res, _) = resolve(&map, "tag");
        let res = res.unwrap();
        assert_eq!(res.path, ["tag"]);
        assert!(!res.fell_through);
    }

    #[test]
    fn test_resolve_unknown_word_falls_through() {
        let map = tree();
        let (res, view) = resolve(&map, "t  banana split");
        let res = res.unwrap();
        assert_eq!(res.path, ["tag"]);
        assert!(res.fell_through);
        assert_eq!(view.remaining(), "banana split");
    }

    #[test]
    fn test_resolve_unknown_top_level() {
        let map = tree();
        assert!(resolve(&map, "nope").0.is_none());
    }

    #[test]
    fn test_rebind() {
        let mut settings = Settings::from_json(r#"{"points_cmd": "!points"}"#).unwrap();
        let mut map = CommandMap::new(false);
        map.insert(build_with(CommandBuilder::from_setting("points_cmd").alias("pts"), &settings))
            .unwrap();
        map.insert(build(CommandBuilder::new("ping"))).unwrap();

        settings.set("points_cmd", "!coins");
        let resolve = |key: &str| crate::command::name_from_settings(&settings, key);
        map.check_rebind(&resolve).unwrap();
        map.apply_rebind(&resolve).unwrap();
        assert!(map.get("points").is_none());
        assert_eq!(map.get("coins").unwrap().name(), "coins");
        assert_eq!(map.get("pts").unwrap().name(), "coins");

        settings.set("points_cmd", "!ping");
        let resolve = |key: &str| crate::command::name_from_settings(&settings, key);
        assert!(matches!(
            map.check_rebind(&resolve),
            Err(RegistrationError::DuplicateCommand(_))
        ));
        assert!(map.get("coins").is_some());
    }
}
