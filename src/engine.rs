//! Decode engine and track abstractions
//!
//! The session never synthesizes audio itself. It drives an external chip
//! emulator through [`DecodeEngine`], which can only move forward in time,
//! and reads tune properties through [`Track`].

use crate::config::EngineSettings;
use crate::fingerprint::Fingerprint;

/// Lowest output sample rate accepted from the host.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Maximum number of interleaved output channels.
pub const MAX_CHANNELS: u16 = 2;

/// Output sample rate and channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count (1 or 2)
    pub channels: u16,
}

impl OutputFormat {
    /// Build a format, clamping to what the engine can produce.
    pub fn clamped(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(MIN_SAMPLE_RATE),
            channels: channels.clamp(1, MAX_CHANNELS),
        }
    }

    /// Interleaved samples per second of audio.
    #[inline]
    pub fn samples_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels)
    }

    /// Convert an interleaved sample count to milliseconds (truncating).
    #[inline]
    pub fn samples_to_ms(&self, samples: u64) -> u64 {
        samples.saturating_mul(1000) / self.samples_per_second()
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            channels: 2,
        }
    }
}

/// A parsed tune, opaque to the session apart from these attributes.
pub trait Track {
    /// Number of subsongs in the file (at least 1 for a playable tune).
    fn subsong_count(&self) -> usize;

    /// Default (start) subsong, 1-based.
    fn default_subsong(&self) -> usize;

    /// Tune payload the fingerprint is computed over.
    fn tune_data(&self) -> &[u8];

    /// Duration database key.
    ///
    /// Defaults to the MD5 of [`Track::tune_data`]. Formats whose database
    /// uses a different digest layout override this.
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.tune_data())
    }
}

/// Failure reported by a decode engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError(msg.to_string())
    }
}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError(msg)
    }
}

/// Forward-only chip emulator driving the session.
///
/// Decoding is deterministic: loading the same track and subsong and
/// decoding the same number of samples always yields the same output.
/// Seeking relies on this.
pub trait DecodeEngine {
    /// Tune type this engine plays.
    type Track: Track;

    /// Apply chip settings and output format. Called before any load.
    fn configure(
        &mut self,
        settings: &EngineSettings,
        format: OutputFormat,
    ) -> Result<(), EngineError>;

    /// Load a tune. Decoding starts once a subsong is selected.
    fn load(&mut self, track: &Self::Track) -> Result<(), EngineError>;

    /// Restart decoding at the beginning of a subsong (1-based).
    fn select_subsong(&mut self, index: usize) -> Result<(), EngineError>;

    /// Fill `buffer` with interleaved 16-bit PCM and return how many samples
    /// were produced. Fewer than `buffer.len()` means the tune ended.
    fn decode(&mut self, buffer: &mut [i16]) -> usize;

    /// Time decoded since the subsong started, in milliseconds.
    fn elapsed_ms(&self) -> u64;

    /// Stop and unload the current tune.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clamping() {
        let fmt = OutputFormat::clamped(4_000, 6);
        assert_eq!(fmt.sample_rate, MIN_SAMPLE_RATE);
        assert_eq!(fmt.channels, 2);

        let fmt = OutputFormat::clamped(48_000, 0);
        assert_eq!(fmt.sample_rate, 48_000);
        assert_eq!(fmt.channels, 1);
    }

    #[test]
    fn test_samples_to_ms() {
        let fmt = OutputFormat::clamped(44_100, 2);
        assert_eq!(fmt.samples_per_second(), 88_200);
        assert_eq!(fmt.samples_to_ms(88_200), 1000);
        assert_eq!(fmt.samples_to_ms(44_100), 500);
    }
}
