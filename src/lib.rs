//! Playback session controller for SID chiptunes
//!
//! Sits between a host media player and a cycle-accurate SID emulator that
//! can only be advanced forward in time. The host pulls fixed-size blocks of
//! PCM; the session supplies them with correct subsong lengths, fades,
//! subsong skipping and seeking.
//!
//! # Features
//! - Subsong lengths from an HVSC `Songlengths.md5` database, with a
//!   configured fallback and a force-default override
//! - Skip-short, skip-to-default and default-only subsong policies
//! - Exponential fade-in and linear fade-out locked to decode time
//! - Random-access seeking on a forward-only decoder (discard forward, or
//!   restart and replay)
//! - Persisted settings through a small key-value store
//!
//! # Module map
//! - [`duration`]: subsong length resolution and the shared database cache
//! - [`database`]: lookup contract and the `Songlengths.md5` reader
//! - [`skip`]: per-block skip decisions
//! - [`fade`]: gain envelope
//! - [`seek`]: seek planning and discard-decode
//! - [`session`]: the controller tying them together
//! - [`engine`] / [`host`]: the two collaborators a session talks to
//!
//! # Quick start
//! ```ignore
//! use sid_session::{NullHost, SeekRequest, Session, SessionConfig};
//!
//! let config = SessionConfig::default()
//!     .with_database_dir("/hvsc/DOCUMENTS")
//!     .with_fade_out(500);
//! let mut session = Session::new(engine, NullHost, config);
//! session.set_format(48_000, 2)?;
//! let summary = session.open(track)?;
//!
//! let mut block = vec![0.0f32; 4096];
//! session.process(&mut block)?;
//! session.seek(SeekRequest::Time(30.0))?;
//! session.seek(SeekRequest::Subsong(summary.default_subsong))?;
//! session.close();
//! ```
//!
//! The crate logs through `tracing` and installs no subscriber.

#![warn(missing_docs)]

pub mod config; // Settings and persistence
pub mod database; // Song length database
pub mod duration; // Subsong length resolution
pub mod engine; // Decode engine contract
pub mod error;
pub mod fade; // Gain envelope
pub mod fingerprint;
pub mod host; // Host callbacks
pub mod seek; // Forward-only seeking
pub mod session; // Session controller
pub mod skip; // Skip policy

/// Output sample rate used until the host asks for another.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

// Public API exports
pub use config::{
    ClockSpeed, EngineSettings, JsonSettingsStore, SamplingMethod, SessionConfig, SettingValue,
    SettingsStore, SidModel,
};
pub use database::{DatabaseSource, DurationDatabase, SonglengthDatabase};
pub use duration::{
    probe_lengths, DurationResolver, DurationSource, SubsongDuration, SubsongDurationTable,
};
pub use engine::{DecodeEngine, EngineError, OutputFormat, Track};
pub use error::{Result, SessionError};
pub use fade::{FadeEnvelope, FadePhase, FadeState};
pub use fingerprint::Fingerprint;
pub use host::{Host, NullHost};
pub use seek::{PositionFlags, SeekEngine, SeekPlan, SeekReport, SeekRequest};
pub use session::{Session, TrackSummary};
pub use skip::{SkipContext, SkipPolicy, SkipReason};
