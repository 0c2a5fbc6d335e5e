//! Messages, identities and the per-invocation record

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::args::Arguments;
use crate::view::TokenView;

/// Chat service a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Mixer,
    Youtube,
    Discord,
}

impl Platform {
    /// Streaming services, as opposed to community chat
    pub fn is_stream_service(self) -> bool {
        !matches!(self, Platform::Discord)
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Mixer => "mixer",
            Platform::Youtube => "youtube",
            Platform::Discord => "discord",
        }
    }

    /// Numeric code used by hosts that speak integers
    pub fn code(self) -> u8 {
        match self {
            Platform::Twitch => 0,
            Platform::Mixer => 1,
            Platform::Youtube => 2,
            Platform::Discord => 3,
        }
    }

    /// Inverse of [`code`](Self::code)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Platform::Twitch),
            1 => Some(Platform::Mixer),
            2 => Some(Platform::Youtube),
            3 => Some(Platform::Discord),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "mixer" => Ok(Platform::Mixer),
            "youtube" => Ok(Platform::Youtube),
            "discord" => Ok(Platform::Discord),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Where a message came from and where replies go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub platform: Platform,
    /// Private message rather than the public chat
    #[serde(default)]
    pub whisper: bool,
}

impl Channel {
    /// Public chat on `platform`
    pub fn public(platform: Platform) -> Self {
        Self {
            platform,
            whisper: false,
        }
    }

    /// Private messages on `platform`
    pub fn whisper(platform: Platform) -> Self {
        Self {
            platform,
            whisper: true,
        }
    }
}

/// A chat participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable, platform-specific user id
    pub id: String,
    /// Display name
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One line of chat input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: Identity,
    pub content: String,
    pub channel: Channel,
    /// Host-monotonic arrival time; cooldowns and scheduling are measured on it
    #[serde(with = "secs_f64")]
    pub timestamp: Duration,
}

impl ChatMessage {
    pub fn new(
        author: Identity,
        content: impl Into<String>,
        channel: Channel,
        timestamp: Duration,
    ) -> Self {
        Self {
            author,
            content: content.into(),
            channel,
            timestamp,
        }
    }

    /// Same message attributed to someone else
    pub fn with_author(mut self, author: Identity) -> Self {
        self.author = author;
        self
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Everything known about one attempt to run a command
///
/// Created once the target command is resolved and discarded when dispatch
/// finishes. The token view is owned here and read by parameter resolution.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub message: ChatMessage,
    /// Prefix that matched, empty for direct invocations
    pub prefix: String,
    /// Space-separated path of the target command
    pub command: String,
    /// Word the user typed to reach the first command in the path
    pub invoked_with: String,
    pub view: TokenView,
    /// Filled in by parameter resolution
    pub args: Arguments,
}

impl Invocation {
    pub fn new(
        message: ChatMessage,
        prefix: impl Into<String>,
        command: impl Into<String>,
        invoked_with: impl Into<String>,
        view: TokenView,
    ) -> Self {
        Self {
            message,
            prefix: prefix.into(),
            command: command.into(),
            invoked_with: invoked_with.into(),
            view,
            args: Arguments::new(),
        }
    }

    pub fn author(&self) -> &Identity {
        &self.message.author
    }

    pub fn channel(&self) -> Channel {
        self.message.channel
    }

    pub fn timestamp(&self) -> Duration {
        self.message.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_codes() {
        for p in [Platform::Twitch, Platform::Mixer, Platform::Youtube, Platform::Discord] {
            assert_eq!(Platform::from_code(p.code()), Some(p));
            assert_eq!(p.as_str().parse::<Platform>(), Ok(p));
        }
        assert!(Platform::Youtube.is_stream_service());
        assert!(!Platform::Discord.is_stream_service());
        assert_eq!(Platform::from_code(9), None);
    }

    #[test]
    fn test_message_from_json() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"author": {"id": "7", "name": "bob"},
                "content": "!ping",
                "channel": {"platform": "twitch"},
                "timestamp": 1.5}"#,
        )
        .unwrap();
        assert_eq!(msg.author.name, "bob");
        assert_eq!(msg.channel, Channel::public(Platform::Twitch));
        assert_eq!(msg.timestamp, Duration::from_millis(1500));
    }

    #[test]
    fn test_with_author() {
        let msg = ChatMessage::new(
            Identity::new("1", "a"),
            "!x",
            Channel::whisper(Platform::Discord),
            Duration::ZERO,
        )
        .with_author(Identity::new("2", "b"));
        assert_eq!(msg.author.id, "2");
        assert!(msg.channel.whisper);
    }
}
