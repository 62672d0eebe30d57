//! Subsong duration resolution
//!
//! A subsong plays for the database length of its tune fingerprint, or for
//! the configured default when there is no database, no entry, or the
//! configuration forces the default. The database is opened lazily on first
//! use and shared by every clone of a [`DurationResolver`]; a database that
//! fails to open stays unavailable instead of being retried per lookup.

use crate::config::SessionConfig;
use crate::database::{DatabaseSource, DurationDatabase, SonglengthDatabase, SONGLENGTHS_FILE};
use crate::engine::Track;
use crate::error::SessionError;
use crate::fingerprint::Fingerprint;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a subsong length came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    /// Duration database entry
    Database,
    /// `default_length` from the configuration
    ConfiguredDefault,
}

/// Resolved length of one subsong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsongDuration {
    /// Length in seconds (0 = unlimited)
    pub seconds: u32,
    /// Origin of the value
    pub source: DurationSource,
}

impl SubsongDuration {
    /// True for subsongs that never end on their own.
    pub fn is_unlimited(&self) -> bool {
        self.seconds == 0
    }
}

/// Per-subsong lengths of an open track, 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsongDurationTable {
    entries: Vec<SubsongDuration>,
}

impl SubsongDurationTable {
    /// Build a table from resolved entries, first subsong first.
    pub fn new(entries: Vec<SubsongDuration>) -> Self {
        Self { entries }
    }

    /// Number of subsongs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a table without subsongs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of subsong `index` (1-based) in seconds.
    pub fn seconds(&self, index: usize) -> Option<u32> {
        self.entry(index).map(|e| e.seconds)
    }

    /// Full entry of subsong `index` (1-based).
    pub fn entry(&self, index: usize) -> Option<&SubsongDuration> {
        self.entries.get(index.checked_sub(1)?)
    }

    /// Sum of all subsong lengths in seconds.
    pub fn total_seconds(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.seconds)).sum()
    }

    /// True if any length is the configured fallback rather than a database value.
    pub fn is_estimate(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.source == DurationSource::ConfiguredDefault)
    }

    /// Iterate entries in subsong order.
    pub fn iter(&self) -> impl Iterator<Item = &SubsongDuration> {
        self.entries.iter()
    }
}

enum DatabaseSlot {
    Unloaded,
    Ready(Arc<dyn DurationDatabase>),
    Unavailable,
}

struct ResolverState {
    source: DatabaseSource,
    slot: DatabaseSlot,
    pending_notice: Option<SessionError>,
}

impl ResolverState {
    fn new(source: DatabaseSource) -> Self {
        let slot = match &source {
            DatabaseSource::None => DatabaseSlot::Unavailable,
            DatabaseSource::Provided(db) => DatabaseSlot::Ready(Arc::clone(db)),
            DatabaseSource::Directory(_) => DatabaseSlot::Unloaded,
        };
        Self {
            source,
            slot,
            pending_notice: None,
        }
    }

    fn database(&mut self) -> Option<Arc<dyn DurationDatabase>> {
        if let DatabaseSlot::Unloaded = self.slot {
            self.slot = self.load();
        }
        match &self.slot {
            DatabaseSlot::Ready(db) => Some(Arc::clone(db)),
            _ => None,
        }
    }

    fn load(&mut self) -> DatabaseSlot {
        let DatabaseSource::Directory(dir) = &self.source else {
            return DatabaseSlot::Unavailable;
        };
        let path = dir.join(SONGLENGTHS_FILE);
        match SonglengthDatabase::open(&path) {
            Ok(db) => {
                info!("Loaded {} song lengths from {}", db.len(), path.display());
                DatabaseSlot::Ready(Arc::new(db))
            }
            Err(err) => {
                warn!(
                    "Song length database unavailable at {}: {}",
                    path.display(),
                    err
                );
                self.pending_notice = Some(SessionError::DatabaseUnavailable {
                    path,
                    reason: err.to_string(),
                });
                DatabaseSlot::Unavailable
            }
        }
    }
}

/// Resolves subsong lengths against a lazily loaded, shared database.
#[derive(Clone)]
pub struct DurationResolver {
    state: Arc<Mutex<ResolverState>>,
}

impl DurationResolver {
    /// Resolver reading from `source`.
    pub fn new(source: DatabaseSource) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResolverState::new(source))),
        }
    }

    /// Resolver for the database directory named in `config`.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(DatabaseSource::from_dir(config.database_dir.as_deref()))
    }

    /// Resolver backed by a caller-supplied database.
    pub fn with_database(db: impl DurationDatabase + 'static) -> Self {
        Self::new(DatabaseSource::Provided(Arc::new(db)))
    }

    /// Point at the database directory of a new configuration.
    ///
    /// A changed directory drops the cached database (including a cached
    /// failure). Provided databases are kept.
    pub fn follow_config(&self, config: &SessionConfig) {
        let mut state = self.state.lock();
        let changed = match (&state.source, config.database_dir.as_deref()) {
            (DatabaseSource::Provided(_), _) => false,
            (DatabaseSource::Directory(current), Some(dir)) => current.as_path() != dir,
            (DatabaseSource::None, None) => false,
            _ => true,
        };
        if changed {
            debug!("Database directory changed to {:?}", config.database_dir);
            *state = ResolverState::new(DatabaseSource::from_dir(config.database_dir.as_deref()));
        }
    }

    /// Whether lookups can reach a database. Loads it on first call.
    pub fn is_available(&self) -> bool {
        self.state.lock().database().is_some()
    }

    /// Directory currently configured, if any.
    pub fn directory(&self) -> Option<PathBuf> {
        match &self.state.lock().source {
            DatabaseSource::Directory(dir) => Some(dir.clone()),
            _ => None,
        }
    }

    /// Length of one subsong in seconds.
    pub fn resolve<T: Track + ?Sized>(
        &self,
        track: &T,
        subsong: usize,
        config: &SessionConfig,
    ) -> u32 {
        let db = self.database_for(config);
        let fingerprint = db.as_ref().map(|_| track.fingerprint());
        lookup(db.as_deref(), fingerprint.as_ref(), subsong, config).seconds
    }

    /// Lengths of every subsong of `track`.
    pub fn resolve_table<T: Track + ?Sized>(
        &self,
        track: &T,
        config: &SessionConfig,
    ) -> SubsongDurationTable {
        let db = self.database_for(config);
        let fingerprint = db.as_ref().map(|_| track.fingerprint());
        let entries = (1..=track.subsong_count())
            .map(|subsong| lookup(db.as_deref(), fingerprint.as_ref(), subsong, config))
            .collect();
        SubsongDurationTable::new(entries)
    }

    /// Take the one-time "database unavailable" notice, if a load just failed.
    pub fn take_notice(&self) -> Option<SessionError> {
        self.state.lock().pending_notice.take()
    }

    fn database_for(&self, config: &SessionConfig) -> Option<Arc<dyn DurationDatabase>> {
        if config.force_default_length {
            return None;
        }
        self.state.lock().database()
    }
}

impl Default for DurationResolver {
    fn default() -> Self {
        Self::new(DatabaseSource::None)
    }
}

impl std::fmt::Debug for DurationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationResolver")
            .field("source", &self.state.lock().source)
            .finish()
    }
}

fn lookup(
    db: Option<&dyn DurationDatabase>,
    fingerprint: Option<&Fingerprint>,
    subsong: usize,
    config: &SessionConfig,
) -> SubsongDuration {
    let found = match (db, fingerprint) {
        (Some(db), Some(fp)) => db.length(fp, subsong),
        _ => None,
    };
    match found {
        Some(seconds) => SubsongDuration {
            seconds,
            source: DurationSource::Database,
        },
        None => SubsongDuration {
            seconds: config.default_length,
            source: DurationSource::ConfiguredDefault,
        },
    }
}

/// Resolve the lengths of a tune without opening a session.
pub fn probe_lengths<T: Track + ?Sized>(
    resolver: &DurationResolver,
    track: &T,
    config: &SessionConfig,
) -> Vec<u32> {
    resolver
        .resolve_table(track, config)
        .iter()
        .map(|e| e.seconds)
        .collect()
}
