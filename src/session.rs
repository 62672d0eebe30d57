//! Playback session controller.
//!
//! A [`Session`] owns one decode engine and at most one open track. The host
//! pulls audio through [`Session::process`] and moves around with
//! [`Session::seek`]; the session decides how long each subsong plays,
//! which subsongs are skipped, and how loud each sample is.
//!
//! # Lifecycle
//!
//! ```text
//! Closed --open--> Open --process--> Playing <--seek--> Seeking
//!    ^                                  |
//!    +--------------close---------------+
//! ```
//!
//! If the engine rejects its configuration, every call returns
//! [`SessionError::EngineInitFailed`] until [`Session::reinitialize`] or
//! [`Session::apply_config`] gets it running.

use crate::config::{EngineSettings, SessionConfig};
use crate::duration::{DurationResolver, DurationSource, SubsongDurationTable};
use crate::engine::{DecodeEngine, OutputFormat, Track};
use crate::error::{Result, SessionError};
use crate::fade::{FadeEnvelope, FadeState};
use crate::fingerprint::Fingerprint;
use crate::host::{Host, NullHost};
use crate::seek::{SeekEngine, SeekPlan, SeekRequest};
use crate::skip::{SkipContext, SkipPolicy};
use tracing::{debug, error, info, warn};

/// What the host learns about a track when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    /// Number of subsongs
    pub subsongs: usize,
    /// Default subsong (1-based)
    pub default_subsong: usize,
    /// Subsong currently playing (1-based)
    pub current_subsong: usize,
    /// Resolved length of each subsong in seconds (0 = unlimited)
    pub durations: Vec<u32>,
    /// Sum of all subsong lengths
    pub total_seconds: u64,
    /// Some length came from the configured default
    pub is_estimate: bool,
    /// Duration database key of the tune
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineStatus {
    Ready,
    Failed(String),
}

/// Per-track state, dropped on close.
struct OpenTrack<T> {
    track: T,
    config: SessionConfig,
    durations: SubsongDurationTable,
    fingerprint: Fingerprint,
    current: usize,
    default: usize,
    skip: SkipPolicy,
    fade: FadeEnvelope,
    /// Interleaved samples decoded since the current subsong started
    position: u64,
    audio_started: bool,
}

impl<T> OpenTrack<T> {
    fn current_duration(&self) -> u32 {
        self.durations.seconds(self.current).unwrap_or(0)
    }

    fn current_is_estimate(&self) -> bool {
        self.durations
            .entry(self.current)
            .is_some_and(|e| e.source == DurationSource::ConfiguredDefault)
    }

    /// Length to show the host: the whole track, or only the current
    /// subsong when seeking is off or lengths are unlimited.
    fn reported_length(&self) -> (u64, bool) {
        if self.config.disable_seek || !self.config.limits_duration() {
            (u64::from(self.current_duration()), self.current_is_estimate())
        } else {
            (self.durations.total_seconds(), self.durations.is_estimate())
        }
    }

    fn summary(&self) -> TrackSummary {
        TrackSummary {
            subsongs: self.durations.len(),
            default_subsong: self.default,
            current_subsong: self.current,
            durations: self.durations.iter().map(|e| e.seconds).collect(),
            total_seconds: self.durations.total_seconds(),
            is_estimate: self.durations.is_estimate(),
            fingerprint: self.fingerprint,
        }
    }
}

/// Playback session driving a [`DecodeEngine`] on behalf of a [`Host`].
///
/// # Example
///
/// ```rust,ignore
/// use sid_session::{Session, SessionConfig, NullHost};
///
/// let config = SessionConfig::default().with_fade_out(500);
/// let mut session = Session::new(engine, NullHost, config);
/// let summary = session.open(track)?;
///
/// let mut block = vec![0.0f32; 4096];
/// while session.process(&mut block)? > 0 {
///     // hand the block to the audio device
/// }
/// session.close();
/// ```
pub struct Session<E: DecodeEngine, H: Host = NullHost> {
    engine: E,
    host: H,
    config: SessionConfig,
    resolver: DurationResolver,
    format: OutputFormat,
    status: EngineStatus,
    /// Settings and format the engine last accepted
    applied: Option<(EngineSettings, OutputFormat)>,
    open: Option<OpenTrack<E::Track>>,
    seeker: SeekEngine,
    pcm: Vec<i16>,
}

impl<E: DecodeEngine, H: Host> Session<E, H> {
    /// Create a session and configure the engine with the default format.
    ///
    /// A configuration failure does not fail construction; it leaves the
    /// session in the engine-failed state.
    pub fn new(engine: E, host: H, config: SessionConfig) -> Self {
        let resolver = DurationResolver::from_config(&config);
        let mut session = Self {
            engine,
            host,
            config,
            resolver,
            format: OutputFormat::default(),
            status: EngineStatus::Ready,
            applied: None,
            open: None,
            seeker: SeekEngine::new(),
            pcm: Vec::new(),
        };
        let _ = session.configure_engine();
        session
    }

    /// Use a shared resolver, so several sessions load the database once.
    #[must_use]
    pub fn with_resolver(mut self, resolver: DurationResolver) -> Self {
        self.resolver = resolver;
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a track and start its first subsong.
    pub fn open(&mut self, track: E::Track) -> Result<TrackSummary> {
        self.ensure_ready()?;
        if self.open.is_some() {
            return Err(SessionError::TrackAlreadyOpen);
        }

        let subsongs = track.subsong_count();
        if subsongs == 0 {
            return Err(SessionError::TrackLoadFailed(
                "track has no subsongs".to_string(),
            ));
        }
        let default = track.default_subsong();
        if default == 0 || default > subsongs {
            return Err(SessionError::TrackLoadFailed(format!(
                "default subsong {} outside 1-{}",
                default, subsongs
            )));
        }

        if !self.engine_is_current() {
            self.configure_engine()?;
        }

        let config = self.config.clone();
        let durations = self.resolver.resolve_table(&track, &config);
        if let Some(notice) = self.resolver.take_notice() {
            self.host.notice(&notice);
        }

        let current = 1;
        let loaded = self
            .engine
            .load(&track)
            .and_then(|()| self.engine.select_subsong(current));
        if let Err(e) = loaded {
            self.engine.reset();
            warn!("Track load failed: {}", e);
            return Err(SessionError::TrackLoadFailed(e.0));
        }

        let mut fade = FadeEnvelope::new(&config, self.format);
        fade.on_track_start(durations.seconds(current).unwrap_or(0));

        let open = OpenTrack {
            fingerprint: track.fingerprint(),
            track,
            skip: SkipPolicy::new(&config, default),
            config,
            durations,
            current,
            default,
            fade,
            position: 0,
            audio_started: false,
        };

        let (seconds, is_estimate) = open.reported_length();
        self.host.report_length(seconds, is_estimate);

        let summary = open.summary();
        info!(
            "Opened {} ({} subsongs, default {}, {} s{})",
            summary.fingerprint,
            summary.subsongs,
            summary.default_subsong,
            summary.total_seconds,
            if summary.is_estimate { ", estimated" } else { "" }
        );
        self.open = Some(open);
        Ok(summary)
    }

    /// Stop the engine and drop the open track. Does nothing when closed.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            self.engine.reset();
            info!("Closed {}", open.fingerprint);
        }
    }

    /// Retry engine configuration after a failure.
    pub fn reinitialize(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Err(SessionError::TrackAlreadyOpen);
        }
        self.configure_engine()
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Fill `buffer` with the next interleaved samples.
    ///
    /// Returns how many samples were written. Zero means the current subsong
    /// is over: it ended, reached its length, or is being skipped.
    pub fn process(&mut self, buffer: &mut [f32]) -> Result<usize> {
        self.ensure_ready()?;
        let format = self.format;
        let open = self.open.as_mut().ok_or(SessionError::NoTrackOpen)?;

        let duration = open.current_duration();
        let ctx = SkipContext {
            current: open.current,
            default: open.default,
            duration,
        };
        if open.skip.should_skip(&ctx) {
            return Ok(0);
        }

        if open.config.limits_duration()
            && duration != 0
            && format.samples_to_ms(open.position) >= u64::from(duration) * 1000
        {
            debug!("Subsong {} reached its {} s length", open.current, duration);
            return Ok(0);
        }

        if self.pcm.len() < buffer.len() {
            self.pcm.resize(buffer.len(), 0);
        }
        let pcm = &mut self.pcm[..buffer.len()];
        let produced = self.engine.decode(pcm).min(buffer.len());
        open.fade.process_pcm(&pcm[..produced], &mut buffer[..produced]);
        open.position += produced as u64;
        if produced > 0 {
            open.audio_started = true;
        }
        Ok(produced)
    }

    /// Move to a subsong or a time within the current subsong.
    ///
    /// Returns the new position in seconds.
    pub fn seek(&mut self, request: SeekRequest) -> Result<f64> {
        self.ensure_ready()?;
        match request {
            SeekRequest::Subsong(index) => self.change_subsong(index),
            SeekRequest::Time(seconds) => self.seek_time(seconds),
        }
    }

    /// Seek using a raw host position value.
    pub fn seek_host_position(&mut self, raw: u32) -> Result<f64> {
        self.seek(SeekRequest::from_host_position(raw))
    }

    fn change_subsong(&mut self, index: usize) -> Result<f64> {
        let open = self.open.as_mut().ok_or(SessionError::NoTrackOpen)?;
        let available = open.durations.len();
        if index == 0 || index > available {
            return Err(SessionError::InvalidSubsong { index, available });
        }

        self.engine.reset();
        let loaded = self
            .engine
            .load(&open.track)
            .and_then(|()| self.engine.select_subsong(index));
        if let Err(e) = loaded {
            // The engine was reset and holds no tune
            open.position = 0;
            open.fade.sync_position(0);
            warn!("Subsong {} failed to load: {}", index, e);
            return Err(SessionError::TrackLoadFailed(e.0));
        }

        open.current = index;
        open.position = 0;
        let duration = open.current_duration();
        open.fade.on_track_start(duration);

        self.host
            .report_length(u64::from(duration), open.current_is_estimate());
        self.host.notify_title_changed();
        info!("Subsong {}/{} ({} s)", index, available, duration);
        Ok(0.0)
    }

    fn seek_time(&mut self, seconds: f64) -> Result<f64> {
        let format = self.format;
        let open = self.open.as_mut().ok_or(SessionError::NoTrackOpen)?;
        let sps = format.samples_per_second() as f64;

        if !seconds.is_finite() {
            let err = SessionError::SeekUnreachable {
                target_ms: u64::MAX,
                reached_ms: format.samples_to_ms(open.position),
            };
            warn!("{} (target {})", err, seconds);
            return Err(err);
        }

        let plan = self.seeker.plan(open.position, seconds, format);
        if plan == SeekPlan::Stay {
            return Ok(open.position as f64 / sps);
        }

        let report = match self
            .seeker
            .execute(&mut self.engine, &open.track, open.current, plan)
        {
            Ok(report) => report,
            Err(e) => {
                // The engine was reset before the reload failed
                open.position = 0;
                open.fade.sync_position(0);
                return Err(SessionError::TrackLoadFailed(e.0));
            }
        };

        open.position = report.landing(open.position);
        if !report.is_complete() {
            open.fade.sync_position(open.position);
            let err = SessionError::SeekUnreachable {
                target_ms: (seconds.max(0.0) * 1000.0) as u64,
                reached_ms: format.samples_to_ms(open.position),
            };
            warn!("{}", err);
            return Err(err);
        }

        open.fade.on_seek(open.position);
        debug!(
            "Seeked to {:.3} s ({} samples decoded)",
            open.position as f64 / sps,
            plan.cost_samples()
        );
        Ok(open.position as f64 / sps)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Request an output format.
    ///
    /// The rate is raised to at least 8000 Hz and channels limited to 1-2.
    /// Once the open track has produced audio the request is ignored. The
    /// format in effect is returned either way.
    pub fn set_format(&mut self, sample_rate: u32, channels: u16) -> Result<OutputFormat> {
        self.ensure_ready()?;
        let requested = OutputFormat::clamped(sample_rate, channels);
        if requested == self.format {
            return Ok(self.format);
        }
        if let Some(open) = &self.open {
            if open.audio_started || self.engine.elapsed_ms() > 0 {
                warn!(
                    "Ignoring format change to {} Hz x{} after playback started",
                    requested.sample_rate, requested.channels
                );
                return Ok(self.format);
            }
        }

        self.format = requested;
        self.configure_engine()?;
        if let Some(open) = self.open.as_mut() {
            self.engine
                .load(&open.track)
                .and_then(|()| self.engine.select_subsong(open.current))
                .map_err(|e| SessionError::TrackLoadFailed(e.0))?;
            open.fade.configure(&open.config, requested);
        }
        debug!(
            "Output format {} Hz x{}",
            requested.sample_rate, requested.channels
        );
        Ok(self.format)
    }

    /// Replace the configuration.
    ///
    /// Engine settings reach the engine right away when no track is open,
    /// otherwise at the next open. An open track keeps playing with the
    /// configuration it was opened with.
    pub fn apply_config(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        self.resolver.follow_config(&config);
        self.config = config;
        if self.open.is_none() && !self.engine_is_current() {
            self.configure_engine()?;
        }
        Ok(())
    }

    fn engine_is_current(&self) -> bool {
        self.status == EngineStatus::Ready
            && self
                .applied
                .as_ref()
                .is_some_and(|(settings, format)| {
                    *settings == self.config.engine && *format == self.format
                })
    }

    fn configure_engine(&mut self) -> Result<()> {
        match self.engine.configure(&self.config.engine, self.format) {
            Ok(()) => {
                self.status = EngineStatus::Ready;
                self.applied = Some((self.config.engine.clone(), self.format));
                debug!("Engine configured: {:?}", self.config.engine);
                Ok(())
            }
            Err(e) => {
                error!("Engine initialization failed: {}", e);
                self.status = EngineStatus::Failed(e.0.clone());
                self.applied = None;
                Err(SessionError::EngineInitFailed(e.0))
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match &self.status {
            EngineStatus::Ready => Ok(()),
            EngineStatus::Failed(reason) => Err(SessionError::EngineInitFailed(reason.clone())),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Position within the current subsong in seconds (0 when closed).
    pub fn position_seconds(&self) -> f64 {
        self.open.as_ref().map_or(0.0, |open| {
            open.position as f64 / self.format.samples_per_second() as f64
        })
    }

    /// Position within the current subsong in milliseconds (0 when closed).
    pub fn position_ms(&self) -> u64 {
        self.open
            .as_ref()
            .map_or(0, |open| self.format.samples_to_ms(open.position))
    }

    /// Subsong currently playing (1-based).
    pub fn current_subsong(&self) -> Option<usize> {
        self.open.as_ref().map(|open| open.current)
    }

    /// Summary of the open track.
    pub fn summary(&self) -> Option<TrackSummary> {
        self.open.as_ref().map(OpenTrack::summary)
    }

    /// Fade envelope of the open track.
    pub fn fade_state(&self) -> Option<FadeState> {
        self.open.as_ref().map(|open| open.fade.state())
    }

    /// Whether the host should offer seeking.
    ///
    /// Seek requests work either way; this only mirrors the configuration
    /// (the open track's snapshot while one is open).
    pub fn is_seekable(&self) -> bool {
        let config = self.open.as_ref().map_or(&self.config, |open| &open.config);
        !config.disable_seek
    }

    /// Output format in effect.
    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Whether a track is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether the engine accepted its configuration.
    pub fn is_engine_ready(&self) -> bool {
        self.status == EngineStatus::Ready
    }

    /// Configuration for the next open.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Duration resolver used at open.
    pub fn resolver(&self) -> &DurationResolver {
        &self.resolver
    }

    /// Host receiving notifications.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Decode engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: DecodeEngine, H: Host> std::fmt::Debug for Session<E, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("format", &self.format)
            .field("status", &self.status)
            .field("current_subsong", &self.current_subsong())
            .field("resolver", &self.resolver)
            .finish()
    }
}
