//! Per-target cooldown manager
//!
//! Two limits apply to each target:
//! 1. **Spacing**: minimum delay since the last action on the target, using
//!    the requested kind's cooldown (or the default)
//! 2. **Window**: at most `max_actions_per_window` actions per fixed window
//!
//! Entries live in a `DashMap`; [`CooldownManager::try_acquire`] checks and
//! records under the entry's shard lock so two callers can never both pass.

use crate::definition::ActionDefinition;
use crate::types::{ActionKind, Target};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cooldown limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownConfig {
    /// Spacing for kinds without an override
    pub default_cooldown: Duration,
    /// Per-kind spacing overrides
    pub per_kind: HashMap<ActionKind, Duration>,
    /// Rate-limit window length
    pub window: Duration,
    /// Actions allowed per target per window
    pub max_actions_per_window: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            default_cooldown: Duration::from_secs(60),
            per_kind: HashMap::new(),
            window: Duration::from_secs(300),
            max_actions_per_window: 5,
        }
    }
}

impl CooldownConfig {
    /// Defaults with per-kind spacing taken from action definitions
    #[must_use]
    pub fn from_definitions<'a>(definitions: impl IntoIterator<Item = &'a ActionDefinition>) -> Self {
        let per_kind = definitions
            .into_iter()
            .map(|d| (d.kind.clone(), d.cooldown))
            .collect();
        Self {
            per_kind,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_kind_cooldown(mut self, kind: ActionKind, cooldown: Duration) -> Self {
        self.per_kind.insert(kind, cooldown);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_window(mut self, window: Duration, max_actions: u32) -> Self {
        self.window = window;
        self.max_actions_per_window = max_actions;
        self
    }

    /// Spacing required before another `kind` action
    #[inline]
    #[must_use]
    pub fn cooldown_for(&self, kind: &ActionKind) -> Duration {
        self.per_kind.get(kind).copied().unwrap_or(self.default_cooldown)
    }
}

/// Rate-limit state for one target
#[derive(Debug, Clone)]
pub struct CooldownEntry {
    /// When the most recent action was recorded
    pub last_action_at: Instant,
    /// Kind of the most recent action
    pub last_kind: ActionKind,
    /// Actions recorded since `window_start`
    pub actions_in_window: u32,
    /// Start of the current rate-limit window
    pub window_start: Instant,
}

/// Verdict of a cooldown check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownCheck {
    /// Action may proceed
    pub allowed: bool,
    /// Why the action was blocked
    pub reason: Option<String>,
    /// How long until the blocking limit lifts
    pub retry_after: Option<Duration>,
}

impl CooldownCheck {
    /// Passing check
    #[inline]
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after: None,
        }
    }

    /// Refusal with the time left on the blocking limit
    #[inline]
    #[must_use]
    pub fn blocked(reason: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            retry_after: Some(retry_after),
        }
    }
}

/// Snapshot of a target's limiter state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownStatus {
    /// Limited target
    pub target: Target,
    /// Kind of the most recent action
    pub last_kind: ActionKind,
    /// Time since the most recent action
    pub since_last_action: Duration,
    /// Actions counted in the current window
    pub actions_in_window: u32,
    /// Window cap
    pub max_actions_per_window: u32,
    /// Time until the current window resets
    pub window_remaining: Duration,
}

/// Per-target rate limiter
#[derive(Debug, Default)]
pub struct CooldownManager {
    config: CooldownConfig,
    entries: DashMap<Target, CooldownEntry>,
}

impl CooldownManager {
    /// Empty limiter
    #[must_use]
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Limits this manager enforces
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Check whether `kind` may run on `target` now
    #[must_use]
    pub fn can_execute(&self, target: &Target, kind: &ActionKind) -> CooldownCheck {
        let now = Instant::now();
        match self.entries.get(target) {
            Some(entry) => self.check_entry(target, &entry, kind, now),
            None => self.check_fresh(target),
        }
    }

    /// Record one attempted action
    pub fn record_action(&self, target: &Target, kind: &ActionKind) {
        let now = Instant::now();
        match self.entries.entry(target.clone()) {
            Entry::Occupied(mut occupied) => self.record_entry(occupied.get_mut(), kind, now),
            Entry::Vacant(vacant) => {
                vacant.insert(Self::fresh_entry(kind, now));
            }
        }
        debug!(target = %target, kind = %kind, "cooldown recorded");
    }

    /// Check and record atomically
    ///
    /// Records only when allowed.
    pub fn try_acquire(&self, target: &Target, kind: &ActionKind) -> CooldownCheck {
        let now = Instant::now();
        let check = match self.entries.entry(target.clone()) {
            Entry::Occupied(mut occupied) => {
                let check = self.check_entry(target, occupied.get(), kind, now);
                if check.allowed {
                    self.record_entry(occupied.get_mut(), kind, now);
                }
                check
            }
            Entry::Vacant(vacant) => {
                let check = self.check_fresh(target);
                if check.allowed {
                    vacant.insert(Self::fresh_entry(kind, now));
                }
                check
            }
        };
        if !check.allowed {
            info!(
                target = %target,
                kind = %kind,
                reason = check.reason.as_deref().unwrap_or_default(),
                retry_after_ms = check.retry_after.map_or(0, |d| d.as_millis() as u64),
                "action blocked by cooldown"
            );
        }
        check
    }

    /// Forget a target's history
    pub fn clear_cooldown(&self, target: &Target) -> bool {
        let removed = self.entries.remove(target).is_some();
        if removed {
            info!(target = %target, "cooldown cleared");
        }
        removed
    }

    /// Evict entries idle for more than twice the window
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let max_idle = self.config.window * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_action_at) <= max_idle);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "cooldown entries evicted");
        }
        evicted
    }

    #[must_use]
    pub fn status(&self, target: &Target) -> Option<CooldownStatus> {
        let now = Instant::now();
        self.entries.get(target).map(|entry| {
            let in_window = now.duration_since(entry.window_start) < self.config.window;
            CooldownStatus {
                target: target.clone(),
                last_kind: entry.last_kind.clone(),
                since_last_action: now.duration_since(entry.last_action_at),
                actions_in_window: if in_window { entry.actions_in_window } else { 0 },
                max_actions_per_window: self.config.max_actions_per_window,
                window_remaining: self
                    .config
                    .window
                    .saturating_sub(now.duration_since(entry.window_start)),
            }
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_entry(&self, target: &Target, entry: &CooldownEntry, kind: &ActionKind, now: Instant) -> CooldownCheck {
        let window_age = now.duration_since(entry.window_start);
        if window_age < self.config.window && entry.actions_in_window >= self.config.max_actions_per_window {
            return CooldownCheck::blocked(
                format!(
                    "Rate limit reached for {target}: {} actions within {}s",
                    entry.actions_in_window,
                    self.config.window.as_secs()
                ),
                self.config.window - window_age,
            );
        }

        let required = self.config.cooldown_for(kind);
        let since = now.duration_since(entry.last_action_at);
        if since < required {
            return CooldownCheck::blocked(
                format!(
                    "Cooldown active for {target}: last action {} was {}s ago, {kind} requires {}s",
                    entry.last_kind,
                    since.as_secs(),
                    required.as_secs()
                ),
                required - since,
            );
        }
        CooldownCheck::allowed()
    }

    /// Verdict for a target with no history; only a zero window cap blocks
    fn check_fresh(&self, target: &Target) -> CooldownCheck {
        if self.config.max_actions_per_window == 0 {
            return CooldownCheck::blocked(
                format!("Rate limit for {target} allows no actions within {}s", self.config.window.as_secs()),
                self.config.window,
            );
        }
        CooldownCheck::allowed()
    }

    fn record_entry(&self, entry: &mut CooldownEntry, kind: &ActionKind, now: Instant) {
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.window_start = now;
            entry.actions_in_window = 0;
        }
        entry.actions_in_window += 1;
        entry.last_action_at = now;
        entry.last_kind = kind.clone();
    }

    fn fresh_entry(kind: &ActionKind, now: Instant) -> CooldownEntry {
        CooldownEntry {
            last_action_at: now,
            last_kind: kind.clone(),
            actions_in_window: 1,
            window_start: now,
        }
    }
}
