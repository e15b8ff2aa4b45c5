//! Debounce policy for watch-triggered ingestion. The watcher plumbing
//! lives elsewhere; this is only the decision of when to run.
//!
//! Rapid multi-file edits would otherwise trigger one update+impact scan
//! per write. Once writes arrive faster than the burst threshold, updates
//! are deferred until the stream has been quiet for a full quiet period,
//! then run once, consolidated.

use crate::config::DebounceConfig;
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    RunNow,
    /// Wait for a quiet period, then run one consolidated update.
    Defer,
}

#[derive(Debug)]
pub struct DebouncePolicy {
    config: DebounceConfig,
    recent: VecDeque<Instant>,
    deferring: bool,
}

impl DebouncePolicy {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
            deferring: false,
        }
    }

    /// Record one write event at `now` and decide whether to act on it.
    pub fn on_write(&mut self, now: Instant) -> DebounceDecision {
        self.recent.push_back(now);
        let window_start = now.checked_sub(self.config.window()).unwrap_or(now);
        while let Some(&oldest) = self.recent.front() {
            if oldest < window_start {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        if self.recent.len() >= self.config.burst_threshold {
            self.deferring = true;
        }
        if self.deferring {
            DebounceDecision::Defer
        } else {
            DebounceDecision::RunNow
        }
    }

    /// True once the deferred, consolidated update should run: the stream
    /// has been quiet for a full quiet period. Resets the policy.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        if !self.deferring {
            return false;
        }
        let quiet = self
            .recent
            .back()
            .map(|&last| now.duration_since(last) >= self.config.quiet_period())
            .unwrap_or(true);
        if quiet {
            self.deferring = false;
            self.recent.clear();
        }
        quiet
    }
}
