//! Seeking on a forward-only decoder.
//!
//! The engine can only move forward, so an absolute seek becomes one of two
//! decode operations:
//!
//! - **Forward**: decode and throw away the samples between here and the
//!   target. Cost grows with the distance.
//! - **Backward**: reset the engine, reload the tune, reselect the subsong
//!   and discard from the start up to the target. Cost grows with the
//!   target position.
//!
//! Both rely on the engine being deterministic, so a backward seek lands on
//! exactly the samples a straight play-through would produce.

use crate::engine::{DecodeEngine, EngineError, OutputFormat};
use bitflags::bitflags;
use tracing::debug;

/// Samples discarded per engine call while seeking.
pub const DISCARD_CHUNK: usize = 4096;

bitflags! {
    /// Flags a host packs into a position value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PositionFlags: u32 {
        /// Low 16 bits carry a 0-based subsong index
        const SUBSONG = 0x8000_0000;
        /// Subsong change issued while auto-advancing to the first subsong
        const SUBSONG_FIRST = 0x4000_0000;
    }
}

/// What the host asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekRequest {
    /// Switch to a subsong (1-based) and start it from the top
    Subsong(usize),
    /// Move to an absolute time in seconds within the current subsong
    Time(f64),
}

impl SeekRequest {
    /// Decode a host position value.
    ///
    /// With either subsong flag set, the low 16 bits are a 0-based subsong
    /// index. Otherwise the value is a time in milliseconds.
    pub fn from_host_position(raw: u32) -> Self {
        let flags = PositionFlags::from_bits_truncate(raw);
        if flags.intersects(PositionFlags::SUBSONG | PositionFlags::SUBSONG_FIRST) {
            SeekRequest::Subsong(usize::from(raw as u16) + 1)
        } else {
            SeekRequest::Time(f64::from(raw) / 1000.0)
        }
    }
}

/// How a time seek will be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPlan {
    /// Already there
    Stay,
    /// Decode and drop `samples` from the current position
    DiscardForward {
        /// Interleaved samples to drop
        samples: u64,
    },
    /// Restart the subsong, then drop `samples` from the start
    ResetAndReplay {
        /// Interleaved samples to drop after the restart
        samples: u64,
    },
}

impl SeekPlan {
    /// Interleaved samples the engine must decode to carry out the plan.
    #[must_use]
    pub fn cost_samples(&self) -> u64 {
        match *self {
            SeekPlan::Stay => 0,
            SeekPlan::DiscardForward { samples } | SeekPlan::ResetAndReplay { samples } => samples,
        }
    }

    /// Position the plan lands on, starting from `current`.
    #[must_use]
    pub fn landing(&self, current: u64) -> u64 {
        match *self {
            SeekPlan::Stay => current,
            SeekPlan::DiscardForward { samples } => current.saturating_add(samples),
            SeekPlan::ResetAndReplay { samples } => samples,
        }
    }
}

/// Outcome of [`SeekEngine::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekReport {
    /// Whether the engine was restarted
    pub reset: bool,
    /// Samples the plan asked to drop
    pub requested: u64,
    /// Samples actually dropped before the engine ran dry
    pub discarded: u64,
}

impl SeekReport {
    /// True when every requested sample was decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.discarded == self.requested
    }

    /// Position the engine ended up at, starting from `current`.
    #[must_use]
    pub fn landing(&self, current: u64) -> u64 {
        if self.reset {
            self.discarded
        } else {
            current.saturating_add(self.discarded)
        }
    }
}

/// Plans and executes time seeks, reusing one discard buffer.
#[derive(Debug, Clone)]
pub struct SeekEngine {
    scratch: Vec<i16>,
}

impl Default for SeekEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekEngine {
    /// Seek engine with a [`DISCARD_CHUNK`]-sample scratch buffer.
    pub fn new() -> Self {
        Self {
            scratch: vec![0; DISCARD_CHUNK],
        }
    }

    /// Plan a move from `current` (interleaved samples) to `target_secs`.
    ///
    /// Both positions are compared in whole frames, `floor(seconds * rate)`.
    /// Sample counts saturate, so out-of-range targets never overflow.
    pub fn plan(&self, current: u64, target_secs: f64, format: OutputFormat) -> SeekPlan {
        let channels = u64::from(format.channels);
        let current_frames = current / channels;
        let target_frames = (target_secs.max(0.0) * f64::from(format.sample_rate)).floor() as u64;

        let plan = if target_frames == current_frames {
            SeekPlan::Stay
        } else if target_frames > current_frames {
            SeekPlan::DiscardForward {
                samples: (target_frames - current_frames).saturating_mul(channels),
            }
        } else {
            SeekPlan::ResetAndReplay {
                samples: target_frames.saturating_mul(channels),
            }
        };
        debug!(
            "Seek plan {:?} (frame {} -> {})",
            plan, current_frames, target_frames
        );
        plan
    }

    /// Carry out `plan` on `engine`.
    ///
    /// A restart reloads `track` and reselects `subsong` first. Running out
    /// of audio early is not an error here; check [`SeekReport::is_complete`].
    pub fn execute<E: DecodeEngine>(
        &mut self,
        engine: &mut E,
        track: &E::Track,
        subsong: usize,
        plan: SeekPlan,
    ) -> Result<SeekReport, EngineError> {
        let reset = matches!(plan, SeekPlan::ResetAndReplay { .. });
        if reset {
            engine.reset();
            engine.load(track)?;
            engine.select_subsong(subsong)?;
        }

        let requested = plan.cost_samples();
        let discarded = self.discard(engine, requested);
        Ok(SeekReport {
            reset,
            requested,
            discarded,
        })
    }

    fn discard<E: DecodeEngine>(&mut self, engine: &mut E, count: u64) -> u64 {
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(self.scratch.len() as u64) as usize;
            let produced = engine.decode(&mut self.scratch[..chunk]);
            remaining -= produced as u64;
            if produced < chunk {
                break;
            }
        }
        count - remaining
    }
}
