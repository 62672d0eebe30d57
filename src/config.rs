//! Session and engine configuration
//!
//! [`SessionConfig`] is the snapshot a session plays a track with. It is
//! persisted through a [`SettingsStore`], a flat key-value store in the
//! shape of the host's registry. Booleans are stored as `0`/`1` integers.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default subsong length in seconds when the database has no entry.
pub const DEFAULT_LENGTH_SECS: u32 = 120;
/// Default threshold for skipping short subsongs, in seconds.
pub const DEFAULT_MIN_LENGTH_SECS: u32 = 3;
/// Default fade-in duration in milliseconds.
pub const DEFAULT_FADE_IN_MS: u32 = 80;
/// Default fade-out duration in milliseconds.
pub const DEFAULT_FADE_OUT_MS: u32 = 500;
/// Largest power-on delay the emulator accepts, in cycles.
pub const MAX_POWER_ON_DELAY: u16 = 0x1FFF;

/// Persisted key names.
pub mod keys {
    #![allow(missing_docs)]
    pub const DEFAULT_LENGTH: &str = "default_length";
    pub const MIN_LENGTH: &str = "min_length";
    pub const FADE_IN: &str = "fade_in";
    pub const FADE_IN_MS: &str = "fade_in_ms";
    pub const FADE_OUT: &str = "fade_out";
    pub const FADE_OUT_MS: &str = "fade_out_ms";
    pub const SKIP_SHORT: &str = "skip_short";
    pub const SKIP_TO_DEFAULT: &str = "default_skip";
    pub const SKIP_ALL_BUT_DEFAULT: &str = "default_only";
    pub const DISABLE_SEEK: &str = "disable_seek";
    pub const FORCE_LENGTH: &str = "force_length";
    pub const DATABASE_PATH: &str = "db_path";

    pub const SID_MODEL: &str = "sid_model";
    pub const CLOCK_SPEED: &str = "clock_speed";
    pub const LOCK_SID_MODEL: &str = "lock_sid_model";
    pub const LOCK_CLOCK_SPEED: &str = "lock_clock_speed";
    pub const SAMPLE_METHOD: &str = "sample_method";
    pub const ENABLE_FILTER: &str = "enable_filter";
    pub const FILTER_6581: &str = "filter_6581";
    pub const FILTER_8580: &str = "filter_8580";
    pub const ENABLE_DIGIBOOST: &str = "enable_digiboost";
    pub const POWER_DELAY_RANDOM: &str = "power_delay_random";
    pub const POWER_DELAY: &str = "power_delay";
}

// ============================================================================
// Engine settings
// ============================================================================

/// SID chip revision to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SidModel {
    /// Original MOS 6581
    #[default]
    #[serde(rename = "6581")]
    Mos6581,
    /// Later MOS 8580
    #[serde(rename = "8580")]
    Mos8580,
}

impl SidModel {
    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SidModel::Mos6581 => "6581",
            SidModel::Mos8580 => "8580",
        }
    }

    /// Lenient parse; anything mentioning the model number matches.
    pub fn parse(s: &str) -> Option<Self> {
        if s.contains("6581") {
            Some(SidModel::Mos6581)
        } else if s.contains("8580") {
            Some(SidModel::Mos8580)
        } else {
            None
        }
    }
}

/// Machine clock standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockSpeed {
    /// 50 Hz PAL machine
    #[default]
    #[serde(rename = "PAL")]
    Pal,
    /// 60 Hz NTSC machine
    #[serde(rename = "NTSC")]
    Ntsc,
}

impl ClockSpeed {
    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockSpeed::Pal => "PAL",
            ClockSpeed::Ntsc => "NTSC",
        }
    }

    /// Lenient parse, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        if upper.contains("PAL") {
            Some(ClockSpeed::Pal)
        } else if upper.contains("NTSC") {
            Some(ClockSpeed::Ntsc)
        } else {
            None
        }
    }
}

/// Resampling quality of the emulator output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingMethod {
    /// Interpolation
    #[default]
    Normal,
    /// Resampling with interpolation (slower)
    Accurate,
}

impl SamplingMethod {
    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMethod::Normal => "Normal",
            SamplingMethod::Accurate => "Accurate",
        }
    }

    /// Lenient parse.
    pub fn parse(s: &str) -> Option<Self> {
        if s.contains("Normal") {
            Some(SamplingMethod::Normal)
        } else if s.contains("Accurate") {
            Some(SamplingMethod::Accurate)
        } else {
            None
        }
    }
}

/// Chip emulation settings, passed through to [`crate::DecodeEngine::configure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Chip model used when the tune does not ask for one
    pub sid_model: SidModel,
    /// Clock used when the tune does not ask for one
    pub clock_speed: ClockSpeed,
    /// Ignore the tune's chip model request
    pub lock_sid_model: bool,
    /// Ignore the tune's clock request
    pub lock_clock_speed: bool,
    /// Output resampling method
    pub sampling: SamplingMethod,
    /// Emulate the analog filter
    pub filter_enabled: bool,
    /// 6581 filter curve, percent (0-100)
    pub filter_6581: u8,
    /// 8580 filter curve, percent (0-100)
    pub filter_8580: u8,
    /// 8580 digi boost
    pub digi_boost: bool,
    /// Randomize the power-on delay
    pub power_delay_random: bool,
    /// Fixed power-on delay in cycles when not randomized
    pub power_delay: u16,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sid_model: SidModel::Mos6581,
            clock_speed: ClockSpeed::Pal,
            lock_sid_model: false,
            lock_clock_speed: false,
            sampling: SamplingMethod::Normal,
            filter_enabled: true,
            filter_6581: 25,
            filter_8580: 50,
            digi_boost: false,
            power_delay_random: true,
            power_delay: 0,
        }
    }
}

impl EngineSettings {
    /// 6581 filter curve as a 0.0-1.0 factor.
    pub fn filter_6581_curve(&self) -> f32 {
        f32::from(self.filter_6581) / 100.0
    }

    /// 8580 filter curve as a 0.0-1.0 factor.
    pub fn filter_8580_curve(&self) -> f32 {
        f32::from(self.filter_8580) / 100.0
    }

    fn validate(&self) -> Result<()> {
        if self.filter_6581 > 100 || self.filter_8580 > 100 {
            return Err(SessionError::ConfigError(format!(
                "filter curves must be 0-100% (got 6581={}%, 8580={}%)",
                self.filter_6581, self.filter_8580
            )));
        }
        if self.power_delay > MAX_POWER_ON_DELAY {
            return Err(SessionError::ConfigError(format!(
                "power-on delay {} exceeds {}",
                self.power_delay, MAX_POWER_ON_DELAY
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Session configuration
// ============================================================================

/// Playback policy snapshot for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length used when the database has no entry, in seconds (0 = unlimited)
    pub default_length: u32,
    /// Subsongs this long or shorter are skipped when `skip_short` is set
    pub min_length: u32,
    /// Fade in at subsong start
    pub fade_in: bool,
    /// Fade-in duration in milliseconds
    pub fade_in_ms: u32,
    /// Fade out before subsong end
    pub fade_out: bool,
    /// Fade-out duration in milliseconds
    pub fade_out_ms: u32,
    /// Skip subsongs no longer than `min_length`
    pub skip_short: bool,
    /// Skip forward to the default subsong when a track opens
    pub skip_to_default: bool,
    /// Play only the default subsong
    pub skip_all_but_default: bool,
    /// Tell the host the track is not seekable
    pub disable_seek: bool,
    /// Ignore the database and always use `default_length`
    pub force_default_length: bool,
    /// Directory holding `Songlengths.md5`
    pub database_dir: Option<PathBuf>,
    /// Chip settings for the decode engine
    pub engine: EngineSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_length: DEFAULT_LENGTH_SECS,
            min_length: DEFAULT_MIN_LENGTH_SECS,
            fade_in: true,
            fade_in_ms: DEFAULT_FADE_IN_MS,
            fade_out: false,
            fade_out_ms: DEFAULT_FADE_OUT_MS,
            skip_short: false,
            skip_to_default: false,
            skip_all_but_default: false,
            disable_seek: false,
            force_default_length: false,
            database_dir: None,
            engine: EngineSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Set the fallback length in seconds.
    pub fn with_default_length(mut self, secs: u32) -> Self {
        self.default_length = secs;
        self
    }

    /// Enable fade-in with the given duration (0 disables it).
    pub fn with_fade_in(mut self, ms: u32) -> Self {
        self.fade_in = ms > 0;
        self.fade_in_ms = ms;
        self
    }

    /// Enable fade-out with the given duration (0 disables it).
    pub fn with_fade_out(mut self, ms: u32) -> Self {
        self.fade_out = ms > 0;
        self.fade_out_ms = ms;
        self
    }

    /// Turn both fades off.
    pub fn without_fades(mut self) -> Self {
        self.fade_in = false;
        self.fade_out = false;
        self
    }

    /// Skip subsongs of at most `min_length` seconds.
    pub fn with_skip_short(mut self, min_length: u32) -> Self {
        self.skip_short = true;
        self.min_length = min_length;
        self
    }

    /// Skip ahead to the default subsong on open.
    pub fn with_skip_to_default(mut self, enabled: bool) -> Self {
        self.skip_to_default = enabled;
        self
    }

    /// Only play the default subsong.
    pub fn with_skip_all_but_default(mut self, enabled: bool) -> Self {
        self.skip_all_but_default = enabled;
        self
    }

    /// Point the duration database at an HVSC `DOCUMENTS` directory.
    pub fn with_database_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_dir = Some(dir.into());
        self
    }

    /// Always use the default length.
    pub fn with_force_default_length(mut self, enabled: bool) -> Self {
        self.force_default_length = enabled;
        self
    }

    /// Report the track as not seekable.
    pub fn with_seek_disabled(mut self, disabled: bool) -> Self {
        self.disable_seek = disabled;
        self
    }

    /// Whether the natural end of a subsong stops output.
    pub fn limits_duration(&self) -> bool {
        self.default_length != 0
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()
    }

    /// Read a configuration from a store; missing keys keep their defaults.
    pub fn load(store: &impl SettingsStore) -> Self {
        let mut cfg = Self::default();
        let e = &mut cfg.engine;

        read_u32(store, keys::DEFAULT_LENGTH, &mut cfg.default_length);
        read_u32(store, keys::MIN_LENGTH, &mut cfg.min_length);
        read_bool(store, keys::FADE_IN, &mut cfg.fade_in);
        read_u32(store, keys::FADE_IN_MS, &mut cfg.fade_in_ms);
        read_bool(store, keys::FADE_OUT, &mut cfg.fade_out);
        read_u32(store, keys::FADE_OUT_MS, &mut cfg.fade_out_ms);
        read_bool(store, keys::SKIP_SHORT, &mut cfg.skip_short);
        read_bool(store, keys::SKIP_TO_DEFAULT, &mut cfg.skip_to_default);
        read_bool(store, keys::SKIP_ALL_BUT_DEFAULT, &mut cfg.skip_all_but_default);
        read_bool(store, keys::DISABLE_SEEK, &mut cfg.disable_seek);
        read_bool(store, keys::FORCE_LENGTH, &mut cfg.force_default_length);
        if let Some(path) = store.get_text(keys::DATABASE_PATH) {
            let path = path.trim();
            cfg.database_dir = (!path.is_empty()).then(|| PathBuf::from(path));
        }

        if let Some(model) = store.get_text(keys::SID_MODEL).as_deref().and_then(SidModel::parse) {
            e.sid_model = model;
        }
        if let Some(clock) = store
            .get_text(keys::CLOCK_SPEED)
            .as_deref()
            .and_then(ClockSpeed::parse)
        {
            e.clock_speed = clock;
        }
        if let Some(method) = store
            .get_text(keys::SAMPLE_METHOD)
            .as_deref()
            .and_then(SamplingMethod::parse)
        {
            e.sampling = method;
        }
        read_bool(store, keys::LOCK_SID_MODEL, &mut e.lock_sid_model);
        read_bool(store, keys::LOCK_CLOCK_SPEED, &mut e.lock_clock_speed);
        read_bool(store, keys::ENABLE_FILTER, &mut e.filter_enabled);
        read_u8(store, keys::FILTER_6581, &mut e.filter_6581);
        read_u8(store, keys::FILTER_8580, &mut e.filter_8580);
        read_bool(store, keys::ENABLE_DIGIBOOST, &mut e.digi_boost);
        read_bool(store, keys::POWER_DELAY_RANDOM, &mut e.power_delay_random);
        if let Some(delay) = store
            .get_int(keys::POWER_DELAY)
            .and_then(|v| u16::try_from(v).ok())
        {
            e.power_delay = delay;
        }

        cfg
    }

    /// Write every field to a store.
    pub fn save(&self, store: &mut impl SettingsStore) {
        let e = &self.engine;

        store.set_int(keys::DEFAULT_LENGTH, i64::from(self.default_length));
        store.set_int(keys::MIN_LENGTH, i64::from(self.min_length));
        store.set_int(keys::FADE_IN, i64::from(self.fade_in));
        store.set_int(keys::FADE_IN_MS, i64::from(self.fade_in_ms));
        store.set_int(keys::FADE_OUT, i64::from(self.fade_out));
        store.set_int(keys::FADE_OUT_MS, i64::from(self.fade_out_ms));
        store.set_int(keys::SKIP_SHORT, i64::from(self.skip_short));
        store.set_int(keys::SKIP_TO_DEFAULT, i64::from(self.skip_to_default));
        store.set_int(keys::SKIP_ALL_BUT_DEFAULT, i64::from(self.skip_all_but_default));
        store.set_int(keys::DISABLE_SEEK, i64::from(self.disable_seek));
        store.set_int(keys::FORCE_LENGTH, i64::from(self.force_default_length));
        let path = self
            .database_dir
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        store.set_text(keys::DATABASE_PATH, &path);

        store.set_text(keys::SID_MODEL, e.sid_model.as_str());
        store.set_text(keys::CLOCK_SPEED, e.clock_speed.as_str());
        store.set_text(keys::SAMPLE_METHOD, e.sampling.as_str());
        store.set_int(keys::LOCK_SID_MODEL, i64::from(e.lock_sid_model));
        store.set_int(keys::LOCK_CLOCK_SPEED, i64::from(e.lock_clock_speed));
        store.set_int(keys::ENABLE_FILTER, i64::from(e.filter_enabled));
        store.set_int(keys::FILTER_6581, i64::from(e.filter_6581));
        store.set_int(keys::FILTER_8580, i64::from(e.filter_8580));
        store.set_int(keys::ENABLE_DIGIBOOST, i64::from(e.digi_boost));
        store.set_int(keys::POWER_DELAY_RANDOM, i64::from(e.power_delay_random));
        store.set_int(keys::POWER_DELAY, i64::from(e.power_delay));
    }
}

fn read_u32(store: &impl SettingsStore, key: &str, target: &mut u32) {
    if let Some(v) = store.get_int(key).and_then(|v| u32::try_from(v).ok()) {
        *target = v;
    }
}

fn read_u8(store: &impl SettingsStore, key: &str, target: &mut u8) {
    if let Some(v) = store.get_int(key).and_then(|v| u8::try_from(v).ok()) {
        *target = v;
    }
}

fn read_bool(store: &impl SettingsStore, key: &str, target: &mut bool) {
    if let Some(v) = store.get_int(key) {
        *target = v != 0;
    }
}

// ============================================================================
// Key-value persistence
// ============================================================================

/// A persisted setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Integer (also used for booleans)
    Int(i64),
    /// Free text
    Text(String),
}

/// Flat key-value settings storage.
pub trait SettingsStore {
    /// Integer value for `key`, if present and numeric.
    fn get_int(&self, key: &str) -> Option<i64>;
    /// Text value for `key`, if present.
    fn get_text(&self, key: &str) -> Option<String>;
    /// Store an integer.
    fn set_int(&mut self, key: &str, value: i64);
    /// Store text.
    fn set_text(&mut self, key: &str, value: &str);
}

impl SettingsStore for BTreeMap<String, SettingValue> {
    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            SettingValue::Int(v) => Some(*v),
            SettingValue::Text(s) => s.trim().parse().ok(),
        }
    }

    fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            SettingValue::Int(v) => Some(v.to_string()),
            SettingValue::Text(s) => Some(s.clone()),
        }
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.insert(key.to_string(), SettingValue::Int(value));
    }

    fn set_text(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), SettingValue::Text(value.to_string()));
    }
}

/// Settings store backed by a JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: BTreeMap<String, SettingValue>,
}

impl JsonSettingsStore {
    /// Open a settings file. A missing file yields an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, values })
    }

    /// Write the store back to its file.
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get_int(key)
    }

    fn get_text(&self, key: &str) -> Option<String> {
        self.values.get_text(key)
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.values.set_int(key, value);
    }

    fn set_text(&mut self, key: &str, value: &str) {
        self.values.set_text(key, value);
    }
}
