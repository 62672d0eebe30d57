//! Subsong skip decisions.
//!
//! Checked before every block. A skipped subsong produces no samples, which
//! the host reads as "end of this subsong" and moves on.

use crate::config::SessionConfig;
use tracing::debug;

/// Why a subsong is being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Only the default subsong is played
    NotDefault,
    /// Still advancing toward the default subsong after open
    BeforeDefault,
    /// Length at or below the minimum
    TooShort,
}

/// What the policy looks at for the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipContext {
    /// Current subsong (1-based)
    pub current: usize,
    /// Default subsong (1-based)
    pub default: usize,
    /// Resolved length of the current subsong in seconds (0 = unlimited)
    pub duration: u32,
}

/// Skip rules for one open track.
#[derive(Debug, Clone)]
pub struct SkipPolicy {
    skip_all_but_default: bool,
    skip_short: bool,
    min_length: u32,
    default_trigger: bool,
}

impl SkipPolicy {
    /// Rules for a track whose default subsong is `default_subsong`.
    ///
    /// The skip-to-default trigger is armed only when the default is not
    /// the first subsong.
    pub fn new(config: &SessionConfig, default_subsong: usize) -> Self {
        Self {
            skip_all_but_default: config.skip_all_but_default,
            skip_short: config.skip_short,
            min_length: config.min_length,
            default_trigger: config.skip_to_default && default_subsong > 1,
        }
    }

    /// Whether the skip-to-default trigger is still armed.
    pub fn is_trigger_armed(&self) -> bool {
        self.default_trigger
    }

    /// Evaluate the rules in order and return the first that applies.
    ///
    /// Reaching the default subsong (or anything after it) disarms the
    /// skip-to-default trigger for the rest of the track.
    pub fn evaluate(&mut self, ctx: &SkipContext) -> Option<SkipReason> {
        if self.skip_all_but_default && ctx.current != ctx.default {
            return Some(SkipReason::NotDefault);
        }

        if self.default_trigger {
            if ctx.current < ctx.default {
                return Some(SkipReason::BeforeDefault);
            }
            debug!("Reached default subsong {}, skip trigger disarmed", ctx.default);
            self.default_trigger = false;
        }

        if self.skip_short && ctx.duration <= self.min_length {
            return Some(SkipReason::TooShort);
        }

        None
    }

    /// True if the current subsong must produce no samples.
    pub fn should_skip(&mut self, ctx: &SkipContext) -> bool {
        match self.evaluate(ctx) {
            Some(reason) => {
                debug!("Skipping subsong {} ({:?})", ctx.current, reason);
                true
            }
            None => false,
        }
    }
}
