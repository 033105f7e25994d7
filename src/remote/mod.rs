//! Remote playback engine control surface.
//!
//! `RemoteController` is the Web API side (device transfer, transport
//! verbs, state queries); `PlayerEngine` is the in-browser playback SDK
//! driven through the shell bridge. Both are traits so the controller and
//! session logic can be exercised against scripted fakes.

pub mod engine;
pub mod web_api;

pub use engine::{BridgeEngine, EngineEvent, EngineFactory, PlayerEngine};
pub use web_api::WebApiClient;

use crate::protocol::EngineState;

/// Failures from the remote Web API, split so callers can branch on the
/// recoverable cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApiError {
    /// Token rejected; the OAuth flow must re-run.
    NotAuthenticated,
    /// The service refused to play this track (region lock, takedown).
    TrackUnavailable,
    /// No active device; re-transfer and retry once.
    NoActiveSession,
    /// Any other HTTP status.
    Http(u16),
    Transport(String),
}

impl std::fmt::Display for RemoteApiError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteApiError::NotAuthenticated => write!(formatter, "remote API rejected the token"),
            RemoteApiError::TrackUnavailable => write!(formatter, "track unavailable for playback"),
            RemoteApiError::NoActiveSession => write!(formatter, "no active playback session"),
            RemoteApiError::Http(status) => write!(formatter, "remote API returned HTTP {status}"),
            RemoteApiError::Transport(message) => {
                write!(formatter, "remote API transport failed: {message}")
            }
        }
    }
}

impl std::error::Error for RemoteApiError {}

/// Transport verbs against the remote playback session.
///
/// Every call fetches a fresh token internally; implementations never
/// cache credentials.
pub trait RemoteController: Send + Sync {
    /// Routes playback to `device_id`. `play: false` keeps the session
    /// paused so the first play request controls the start position.
    fn transfer_playback(&self, device_id: &str, play: bool) -> Result<(), RemoteApiError>;

    /// Starts `uri` from `position_ms` on the device.
    fn play_uri(&self, device_id: &str, uri: &str, position_ms: u64) -> Result<(), RemoteApiError>;

    fn pause(&self) -> Result<(), RemoteApiError>;

    /// Resumes whatever the session already holds, without changing track.
    fn resume(&self, device_id: &str) -> Result<(), RemoteApiError>;

    fn seek(&self, position_ms: u64) -> Result<(), RemoteApiError>;

    /// Skips to the session's next queued track.
    ///
    /// Not used by the lockstep flow: track changes there go through the
    /// GUI playlist (`AdvanceToNextTrack`) so both players stay on the
    /// same row. This verb exists for driving the session directly, e.g.
    /// when no synced playlist view is in play.
    fn next_track(&self) -> Result<(), RemoteApiError>;

    /// Returns to the previous queued track. Same caveat as
    /// [`next_track`](Self::next_track); the lockstep flow restarts the
    /// current track on both clocks instead.
    fn previous_track(&self) -> Result<(), RemoteApiError>;

    /// Current playback state; `Ok(None)` means no active session.
    fn playback_state(&self) -> Result<Option<EngineState>, RemoteApiError>;

    /// Volume as 0.0..=1.0.
    fn set_volume(&self, volume: f32) -> Result<(), RemoteApiError>;
}
