//! Fixed-window rate limiting
//!
//! A [`Cooldown`] admits `rate` invocations per `per` window. Each command
//! keeps one [`CooldownMapping`] per declared cooldown; the mapping lazily
//! creates a [`CooldownBucket`] per author (user scope) or a single shared
//! bucket (global scope).
//!
//! A window opens at the first admitted invocation and resets once `per`
//! has elapsed since it opened. Rejections never consume capacity.

use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CmdResult, CommandError};

/// Who shares a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketScope {
    /// One bucket per author
    User,
    /// One bucket for everybody
    Global,
}

/// Rate limit declaration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cooldown {
    pub rate: u32,
    pub per: Duration,
    pub scope: BucketScope,
}

impl Cooldown {
    /// `rate` uses per `per` seconds, per author
    pub fn user(per: f64, rate: u32) -> Self {
        Self::new(rate, per, BucketScope::User)
    }

    /// `rate` uses per `per` seconds, shared by everybody
    pub fn global(per: f64, rate: u32) -> Self {
        Self::new(rate, per, BucketScope::Global)
    }

    fn new(rate: u32, per: f64, scope: BucketScope) -> Self {
        // out-of-range windows become zero so `validate` rejects them
        let per = if per > 0.0 {
            Duration::try_from_secs_f64(per).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self { rate, per, scope }
    }

    /// Reason the declaration cannot be used, if any
    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err("rate must be at least 1".to_string());
        }
        if self.per.is_zero() {
            return Err("window must be a positive number of seconds".to_string());
        }
        Ok(())
    }
}

/// One fixed window of usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownBucket {
    rate: u32,
    per: Duration,
    window_start: Duration,
    count: u32,
}

impl CooldownBucket {
    fn new(cooldown: &Cooldown, now: Duration) -> Self {
        Self {
            rate: cooldown.rate,
            per: cooldown.per,
            window_start: now,
            count: 0,
        }
    }

    /// Uses left in the current window as of `now`
    pub fn remaining(&self, now: Duration) -> u32 {
        if now.saturating_sub(self.window_start) >= self.per {
            self.rate
        } else {
            self.rate.saturating_sub(self.count)
        }
    }

    /// Consume one use, or report how long until the window resets
    pub fn update_rate_limit(&mut self, now: Duration) -> Option<Duration> {
        let elapsed = now.saturating_sub(self.window_start);
        if elapsed >= self.per {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.rate {
            return Some(self.per - now.saturating_sub(self.window_start));
        }
        self.count += 1;
        None
    }
}

/// Bucket lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BucketKey {
    User(String),
    Global,
}

/// Buckets for one cooldown declaration
#[derive(Debug, Clone)]
pub struct CooldownMapping {
    cooldown: Cooldown,
    buckets: AHashMap<BucketKey, CooldownBucket>,
}

impl CooldownMapping {
    pub fn new(cooldown: Cooldown) -> Self {
        Self {
            cooldown,
            buckets: AHashMap::new(),
        }
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn key(&self, author_id: &str) -> BucketKey {
        match self.cooldown.scope {
            BucketScope::User => BucketKey::User(author_id.to_string()),
            BucketScope::Global => BucketKey::Global,
        }
    }

    /// Bucket for `author_id`, created on first use
    pub fn bucket(&mut self, author_id: &str, now: Duration) -> &mut CooldownBucket {
        let key = self.key(author_id);
        let cooldown = self.cooldown;
        self.buckets
            .entry(key)
            .or_insert_with(|| CooldownBucket::new(&cooldown, now))
    }

    /// Consume one use for `author_id`
    pub fn update(&mut self, author_id: &str, now: Duration) -> Option<Duration> {
        self.bucket(author_id, now).update_rate_limit(now)
    }

    /// Number of live buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Forget all usage
    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

/// Apply every cooldown of `command` in order, stopping at the first rejection
///
/// Mappings before the rejecting one keep the use they consumed.
pub fn apply_cooldowns(
    command: &str,
    mappings: &mut [CooldownMapping],
    author_id: &str,
    now: Duration,
) -> CmdResult<()> {
    for mapping in mappings.iter_mut() {
        if let Some(retry_after) = mapping.update(author_id, now) {
            return Err(CommandError::OnCooldown {
                command: command.to_string(),
                scope: mapping.cooldown.scope,
                retry_after,
            });
        }
    }
    Ok(())
}
