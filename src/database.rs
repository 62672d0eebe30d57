//! Song length database lookup
//!
//! The session only needs one question answered: how long does subsong `n`
//! of the tune with fingerprint `f` play? [`DurationDatabase`] is that
//! contract. [`SonglengthDatabase`] answers it from an HVSC
//! `Songlengths.md5` file or from entries inserted in memory.

use crate::fingerprint::Fingerprint;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File name of the song length database inside an HVSC `DOCUMENTS` directory.
pub const SONGLENGTHS_FILE: &str = "Songlengths.md5";

/// Lookup contract for song lengths.
pub trait DurationDatabase: Send + Sync {
    /// Length in seconds of `subsong` (1-based), or `None` if unknown.
    ///
    /// `Some(0)` is a real answer meaning the subsong plays indefinitely.
    fn length(&self, fingerprint: &Fingerprint, subsong: usize) -> Option<u32>;
}

/// Where a resolver gets its database from.
#[derive(Clone, Default)]
pub enum DatabaseSource {
    /// No database; every lookup uses the configured default
    #[default]
    None,
    /// HVSC `DOCUMENTS` directory containing [`SONGLENGTHS_FILE`]
    Directory(PathBuf),
    /// Database supplied by the caller
    Provided(Arc<dyn DurationDatabase>),
}

impl DatabaseSource {
    /// Source for an optional configured directory.
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => DatabaseSource::Directory(dir.to_path_buf()),
            None => DatabaseSource::None,
        }
    }
}

impl fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSource::None => write!(f, "None"),
            DatabaseSource::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            DatabaseSource::Provided(_) => write!(f, "Provided(..)"),
        }
    }
}

/// Song lengths keyed by tune fingerprint.
#[derive(Debug, Clone, Default)]
pub struct SonglengthDatabase {
    entries: HashMap<Fingerprint, Vec<u32>>,
}

impl SonglengthDatabase {
    /// Empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `Songlengths.md5` from an HVSC `DOCUMENTS` directory.
    pub fn open_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::open(dir.as_ref().join(SONGLENGTHS_FILE))
    }

    /// Read a `Songlengths.md5` file.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Parse database text.
    ///
    /// Section headers, `;` comments and blank lines are ignored. Lines that
    /// do not parse are skipped.
    pub fn parse(text: &str) -> Self {
        let mut db = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('[') {
                continue;
            }
            match parse_entry(line) {
                Some((fingerprint, lengths)) => {
                    db.entries.insert(fingerprint, lengths);
                }
                None => debug!("Skipping malformed song length line {}", line_no + 1),
            }
        }
        db
    }

    /// Add or replace the lengths of one tune.
    pub fn insert(&mut self, fingerprint: Fingerprint, lengths: Vec<u32>) {
        self.entries.insert(fingerprint, lengths);
    }

    /// Number of tunes in the database.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no tune is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DurationDatabase for SonglengthDatabase {
    fn length(&self, fingerprint: &Fingerprint, subsong: usize) -> Option<u32> {
        let index = subsong.checked_sub(1)?;
        self.entries.get(fingerprint)?.get(index).copied()
    }
}

fn parse_entry(line: &str) -> Option<(Fingerprint, Vec<u32>)> {
    let (key, value) = line.split_once('=')?;
    let fingerprint = key.parse().ok()?;
    let lengths = value
        .split_whitespace()
        .map(parse_length)
        .collect::<Option<Vec<_>>>()?;
    if lengths.is_empty() {
        return None;
    }
    Some((fingerprint, lengths))
}

/// Parse `m:ss`, `m:ss.mmm` or either with a `(X)` attribute suffix.
/// Fractions of a second round up.
fn parse_length(token: &str) -> Option<u32> {
    let time = token.split('(').next()?;
    let (minutes, rest) = time.split_once(':')?;
    let (seconds, fraction) = match rest.split_once('.') {
        Some((s, f)) => (s, Some(f)),
        None => (rest, None),
    };
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    let round_up = match fraction {
        Some(f) => {
            if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            f.bytes().any(|b| b != b'0')
        }
        None => false,
    };
    minutes
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_add(u32::from(round_up))
}
