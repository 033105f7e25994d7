//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the GUI shell
//! boundary, the remote session manager, the synchronization controller, and
//! the playlist loader. Payloads that cross the shell bridge carry serde
//! derives with a `type` tag; the envelope itself never leaves the process.

use std::sync::Arc;

use crate::config::Config;
use crate::visualizer::VisualizerFrame;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Gui(GuiMessage),
    Shell(ShellCommand),
    Session(SessionMessage),
    Sync(SyncMessage),
    Playlist(PlaylistMessage),
    Config(ConfigMessage),
}

/// One playlist entry as the GUI sees it.
///
/// The GUI only renders metadata; whether a row is backed by a real local
/// file or by a remote stream is carried in the variant, not guessed at
/// runtime.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuiTrack {
    Local(LocalTrack),
    RemoteBacked(RemoteBackedTrack),
}

impl GuiTrack {
    /// Title/artist pair the GUI reports back on track-change events.
    pub fn label(&self) -> (&str, &str) {
        match self {
            GuiTrack::Local(track) => (&track.title, &track.artist),
            GuiTrack::RemoteBacked(track) => (&track.title, &track.artist),
        }
    }

    /// Declared duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        match self {
            GuiTrack::Local(track) => track.duration_ms,
            GuiTrack::RemoteBacked(track) => track.duration_ms,
        }
    }
}

/// A track the GUI plays from a real local audio source.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LocalTrack {
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
    /// Local audio URL handed to the GUI's own audio element.
    pub url: String,
}

/// A track whose audio is produced by the remote engine while the GUI
/// counts time against a silent placeholder.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RemoteBackedTrack {
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
    /// Remote-service track URI.
    pub uri: String,
}

/// Remote playlist catalog entry surfaced to the GUI playlist selector.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
}

/// Events arriving from the GUI shell boundary.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuiMessage {
    /// The GUI switched to another playlist row.
    TrackChanged {
        track: GuiTrack,
        index: usize,
        playlist_len: usize,
    },
    /// Continuous time update from the GUI's (silent) audio element.
    AudioTimeUpdate { position_ms: u64 },
    /// Seek-bar input as a fraction of the bar width.
    SeekBarInput { fraction: f32 },
    PlayPressed,
    PausePressed,
    NextPressed,
    PreviousPressed,
    VolumeChanged { volume: f32 },
    /// Explicit "connect to the streaming account" action.
    ConnectRequested,
    RequestPlaylists,
    LoadPlaylist { playlist_id: String },
    LoadLikedTracks,
    WindowMinimized,
    WindowClosed,
}

/// Commands sent out to the GUI shell boundary.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellCommand {
    /// Swap the GUI audio element source for a silent placeholder whose
    /// duration matches the remote track.
    BindPlaceholder {
        uri: String,
        duration_ms: u64,
        wav_base64: String,
    },
    PauseLocalAudio,
    ResumeLocalAudio { offset_ms: u64 },
    /// Ask the GUI to advance to the next playlist entry; the GUI answers
    /// with a fresh `TrackChanged`.
    AdvanceToNextTrack,
    /// `None` restores the default window title.
    SetNowPlayingTitle { title: Option<String> },
    SetPlayIndicator { playing: bool },
    VisualizerFrame { frame: VisualizerFrame },
    ReplacePlaylist { tracks: Vec<GuiTrack> },
    AppendPlaylistTracks { tracks: Vec<GuiTrack> },
    PlaylistsAvailable { playlists: Vec<PlaylistInfo> },
    MinimizeWindow,
    CloseWindow,
}

/// Snapshot of the remote engine's playback state as delivered by its
/// `player_state_changed` events and state queries.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct EngineState {
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub track_uri: Option<String>,
    #[serde(default)]
    pub track_title: Option<String>,
    #[serde(default)]
    pub track_artist: Option<String>,
}

/// Session-domain notifications.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// The remote engine rejected our credentials; the OAuth collaborator
    /// must re-run the authorization flow.
    AuthenticationRequired,
    DeviceReady { device_id: String },
    DeviceLost { device_id: String },
    EngineStateChanged(EngineState),
    EngineError { message: String },
}

/// Synchronization-domain notifications (observability and tests).
#[derive(Debug, Clone)]
pub enum SyncMessage {
    PhaseChanged(crate::sync_controller::SyncPhase),
    DriftCorrected { local_ms: u64, remote_ms: u64 },
}

/// One resolver entry produced while a playlist streams in.
#[derive(Debug, Clone)]
pub struct IndexedTrack {
    pub title: String,
    pub artist: String,
    pub uri: String,
    pub duration_ms: u64,
}

/// Playlist-loader commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    LoadStarted { source: String },
    /// Resolver entries for a freshly parsed batch of remote tracks.
    TracksIndexed { entries: Arc<Vec<IndexedTrack>> },
    /// `total` is 0 until the stream header has announced it.
    LoadProgress { loaded: usize, total: usize },
    LoadFinished { loaded: usize, skipped: usize },
    LoadFailed { source: String, error: String },
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}
