//! Callbacks into the media player hosting a session.

use crate::error::SessionError;

/// Notifications a session sends to its host.
///
/// Every method has an empty default so hosts implement only what they
/// display.
pub trait Host {
    /// Length of what is playing, in seconds.
    ///
    /// `is_estimate` is set when some subsong length came from the
    /// configured default rather than the database.
    fn report_length(&mut self, seconds: u64, is_estimate: bool) {
        let _ = (seconds, is_estimate);
    }

    /// The current subsong changed; titles built from it are stale.
    fn notify_title_changed(&mut self) {}

    /// Non-fatal condition worth showing to the user.
    fn notice(&mut self, error: &SessionError) {
        let _ = error;
    }
}

/// Host that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {}
