//! Chat Bot Settings
//!
//! Typed configuration values handed to the command engine by the host.
//!
//! The host owns loading (files, UI forms, payloads pushed by the chat client);
//! this crate only turns an already-loaded JSON document into a [`Settings`]
//! value with typed accessors, validates it, and supports in-place reloads.
//!
//! # Known keys
//!
//! - `prefixes` (or `prefix`) - string or list of strings, default `["!"]`
//! - `case_insensitive` - top-level command lookup ignores case
//! - `reply_delay_threshold` - seconds; shorter reply delays are sent immediately
//! - `drain_cap` - scheduled entries fired per tick
//! - `ignore_extra_default` - default for a command's `ignore_extra` flag
//!
//! Any other key is kept verbatim and can be read back with the typed getters.
//! Commands use this to take their names from settings (`settings::KEY`) and
//! checks use it to look up permission levels.
//!
//! # Example
//!
//! ```rust
//! use chatbot_settings::Settings;
//!
//! let settings = Settings::from_json(r#"{"prefix": "?", "points_cmd": "!points"}"#).unwrap();
//! assert_eq!(settings.prefixes(), ["?"]);
//! assert_eq!(settings.get_str("points_cmd"), Some("!points"));
//! ```

mod error;
mod store;

pub use error::SettingsError;
pub use store::{Settings, DEFAULT_DRAIN_CAP, DEFAULT_PREFIX, DEFAULT_REPLY_DELAY_THRESHOLD};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::{Settings, SettingsError};
}
