//! Fade-in / fade-out gain envelope
//!
//! The envelope runs in lockstep with decoded samples: every call to
//! [`FadeEnvelope::apply`] advances its clock by one interleaved sample.
//!
//! # Curves
//!
//! - Fade-in is exponential. The gain starts at [`FADE_IN_FLOOR`] and is
//!   multiplied by `10^(3000 / fade_in_ms / (rate * channels))` per sample,
//!   which climbs the 60 dB from the floor to 1.0 in `fade_in_ms`.
//! - Fade-out is linear from just below 1.0 down to silence over
//!   `fade_out_ms`, starting at `duration - fade_out_ms`.
//!
//! The fade-out trigger is checked on every sample whatever the phase, so a
//! fade-in that is still running never postpones the fade-out.

use crate::config::SessionConfig;
use crate::engine::OutputFormat;
use tracing::debug;

/// Initial fade-in gain (-60 dB). Must be non-zero for the ratio to climb.
pub const FADE_IN_FLOOR: f64 = 0.001;

/// Gain a fade-out starts from.
pub const FADE_OUT_START: f64 = 0.999;

/// Scale factor from 16-bit PCM to [-1.0, 1.0).
pub const PCM_SCALE: f32 = 1.0 / 32768.0;

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    /// No fade pending; unity gain
    Idle,
    /// Ramping up after a (re)start
    FadingIn,
    /// Unity gain, waiting for the fade-out point
    Holding,
    /// Ramping down to silence
    FadingOut,
}

/// Snapshot of the envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeState {
    /// Current phase
    pub phase: FadePhase,
    /// Current gain in [0, 1]
    pub level: f32,
}

/// Per-sample gain envelope for one subsong.
#[derive(Debug, Clone)]
pub struct FadeEnvelope {
    fade_in_ms: u32,
    fade_out_ms: u32,
    format: OutputFormat,
    step_in: f64,
    step_out: f64,
    duration_secs: u32,
    trigger: Option<u64>,
    out_ready: bool,
    phase: FadePhase,
    level: f64,
    position: u64,
}

impl FadeEnvelope {
    /// Envelope using the fade settings of `config`.
    ///
    /// Starts idle; call [`FadeEnvelope::on_track_start`] when a subsong begins.
    pub fn new(config: &SessionConfig, format: OutputFormat) -> Self {
        let mut envelope = Self {
            fade_in_ms: 0,
            fade_out_ms: 0,
            format,
            step_in: 1.0,
            step_out: 0.0,
            duration_secs: 0,
            trigger: None,
            out_ready: false,
            phase: FadePhase::Idle,
            level: 1.0,
            position: 0,
        };
        envelope.configure(config, format);
        envelope
    }

    /// Recompute step sizes for new fade settings or output format.
    ///
    /// The current phase and level are kept.
    pub fn configure(&mut self, config: &SessionConfig, format: OutputFormat) {
        self.fade_in_ms = if config.fade_in { config.fade_in_ms } else { 0 };
        self.fade_out_ms = if config.fade_out { config.fade_out_ms } else { 0 };
        self.format = format;

        let sps = format.samples_per_second() as f64;
        self.step_in = if self.fade_in_ms > 0 {
            10f64.powf(3000.0 / f64::from(self.fade_in_ms) / sps)
        } else {
            1.0
        };
        self.step_out = if self.fade_out_ms > 0 {
            1.0 / (f64::from(self.fade_out_ms) / 1000.0 * sps)
        } else {
            0.0
        };
        self.trigger = self.compute_trigger();
    }

    /// Restart the envelope for a subsong of `duration_secs` (0 = unlimited).
    pub fn on_track_start(&mut self, duration_secs: u32) {
        self.duration_secs = duration_secs;
        self.trigger = self.compute_trigger();
        self.restart();
    }

    /// Resynchronize after a seek that landed at `position` interleaved samples.
    ///
    /// Landing at 0 restarts the fade-in. Landing before the fade-out point
    /// re-arms the fade-out; landing after it plays on at full gain.
    pub fn on_seek(&mut self, position: u64) {
        if position == 0 {
            self.restart();
            return;
        }
        self.position = position;
        self.level = 1.0;
        match self.trigger {
            Some(trigger) if position < trigger => {
                self.out_ready = true;
                self.phase = FadePhase::Holding;
            }
            _ => {
                self.out_ready = false;
                self.phase = FadePhase::Idle;
            }
        }
        debug!("Fade envelope resynced at sample {}: {:?}", position, self.phase);
    }

    /// Move the clock without touching phase or level.
    pub fn sync_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Scale one sample by the next gain value.
    #[inline]
    pub fn apply(&mut self, sample: f32) -> f32 {
        sample * self.next_gain()
    }

    /// Convert 16-bit PCM to float and apply the envelope.
    ///
    /// Processes `min(input.len(), output.len())` samples.
    pub fn process_pcm(&mut self, input: &[i16], output: &mut [f32]) {
        for (out, &raw) in output.iter_mut().zip(input) {
            *out = self.apply(f32::from(raw) * PCM_SCALE);
        }
    }

    /// Current phase and gain.
    pub fn state(&self) -> FadeState {
        let level = match self.phase {
            FadePhase::FadingIn | FadePhase::FadingOut => self.level as f32,
            FadePhase::Idle | FadePhase::Holding => 1.0,
        };
        FadeState {
            phase: self.phase,
            level,
        }
    }

    /// Interleaved samples processed since the subsong started.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Sample index at which the fade-out begins, if one is scheduled.
    pub fn fade_out_trigger(&self) -> Option<u64> {
        self.trigger
    }

    /// Fade-out start in milliseconds, if one is scheduled.
    pub fn fade_out_trigger_ms(&self) -> Option<u64> {
        self.trigger.map(|t| self.format.samples_to_ms(t))
    }

    fn restart(&mut self) {
        self.position = 0;
        self.out_ready = self.trigger.is_some();
        if self.fade_in_ms > 0 {
            self.phase = FadePhase::FadingIn;
            self.level = FADE_IN_FLOOR;
        } else {
            self.phase = self.resting_phase();
            self.level = 1.0;
        }
    }

    fn resting_phase(&self) -> FadePhase {
        if self.out_ready {
            FadePhase::Holding
        } else {
            FadePhase::Idle
        }
    }

    fn compute_trigger(&self) -> Option<u64> {
        if self.fade_out_ms == 0 || self.duration_secs == 0 {
            return None;
        }
        let trigger_ms = i64::from(self.duration_secs) * 1000 - i64::from(self.fade_out_ms);
        if trigger_ms <= 0 {
            return None;
        }
        Some(trigger_ms as u64 * self.format.samples_per_second() / 1000)
    }

    fn next_gain(&mut self) -> f32 {
        if self.out_ready {
            if let Some(trigger) = self.trigger {
                if self.position >= trigger {
                    self.out_ready = false;
                    self.phase = FadePhase::FadingOut;
                    self.level = self.level.min(FADE_OUT_START);
                    debug!("Fade-out started at sample {}", self.position);
                }
            }
        }

        let gain = match self.phase {
            FadePhase::FadingIn => {
                self.level *= self.step_in;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.phase = self.resting_phase();
                }
                self.level
            }
            FadePhase::FadingOut => {
                self.level = (self.level - self.step_out).max(0.0);
                self.level
            }
            FadePhase::Idle | FadePhase::Holding => 1.0,
        };

        self.position += 1;
        gain as f32
    }
}
