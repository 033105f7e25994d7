//! Playback synchronization controller.
//!
//! The single writer of [`SyncState`]. Starts remote playback when the GUI
//! changes track, keeps the GUI's silent clock and the remote engine's
//! clock reconciled, detects track end / external pause / device loss, and
//! mirrors confirmed state back to the GUI. At any moment exactly one side
//! is the reconciliation authority: a local-origin seek in flight blocks
//! adoption of remote positions, and adopted remote positions suppress new
//! local seeks within tolerance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::{Config, SyncConfig, VisualizerConfig};
use crate::placeholder::PlaceholderCache;
use crate::protocol::{
    ConfigMessage, EngineState, GuiMessage, GuiTrack, Message, PlaylistMessage, SessionMessage,
    ShellCommand,
};
use crate::remote::{RemoteApiError, RemoteController};
use crate::resolver::TrackResolver;
use crate::session::SessionHandle;
use crate::visualizer::Visualizer;

const LOOP_SLEEP: Duration = Duration::from_millis(10);

/// Controller phases; `PhaseChanged` bus events mirror every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Resolving,
    Transferring,
    Starting,
    Playing,
    Paused,
    TrackEnded,
    Error,
}

/// Reconciliation bookkeeping. Only the controller mutates this.
#[derive(Debug)]
pub struct SyncState {
    pub phase: SyncPhase,
    pub is_remote_playing: bool,
    pub last_known_remote_position_ms: u64,
    /// A local-origin seek was issued and not yet confirmed by a poll;
    /// remote positions are not adopted and no further seek is issued.
    pub seek_in_flight: bool,
    /// Seek suppression window right after a playback start.
    pub playback_starting_until: Option<Instant>,
    /// Resume sequence in progress; track-change re-entrancy is ignored.
    pub resuming: bool,
    pub last_played_uri: Option<String>,
    /// Real remote duration; seek-bar fractions translate against this.
    pub current_track_duration_ms: u64,
    pub playlist_index: usize,
    pub playlist_len: usize,
}

impl SyncState {
    fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            is_remote_playing: false,
            last_known_remote_position_ms: 0,
            seek_in_flight: false,
            playback_starting_until: None,
            resuming: false,
            last_played_uri: None,
            current_track_duration_ms: 0,
            playlist_index: 0,
            playlist_len: 0,
        }
    }

    fn in_start_window(&self) -> bool {
        self.playback_starting_until
            .is_some_and(|until| Instant::now() < until)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisualizerMode {
    Running,
    Decaying,
    Stopped,
}

pub struct SyncController {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    sync_config: SyncConfig,
    visualizer_config: VisualizerConfig,
    ensure_ready_timeout: Duration,
    state: SyncState,
    resolver: TrackResolver,
    placeholders: PlaceholderCache,
    session: Arc<dyn SessionHandle>,
    remote: Arc<dyn RemoteController>,
    visualizer: Visualizer,
    visualizer_mode: VisualizerMode,
    last_poll_at: Instant,
    last_visualizer_tick_at: Instant,
    resume_verify_at: Option<Instant>,
}

impl SyncController {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        config: &Config,
        session: Arc<dyn SessionHandle>,
        remote: Arc<dyn RemoteController>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            sync_config: config.sync.clone(),
            visualizer_config: config.visualizer.clone(),
            ensure_ready_timeout: Duration::from_millis(config.remote.init_timeout_ms + 2_000),
            state: SyncState::new(),
            resolver: TrackResolver::new(),
            placeholders: PlaceholderCache::new(),
            session,
            remote,
            visualizer: Visualizer::new(&config.visualizer),
            visualizer_mode: VisualizerMode::Stopped,
            last_poll_at: Instant::now(),
            last_visualizer_tick_at: Instant::now(),
            resume_verify_at: None,
        }
    }

    /// Blocking controller loop; returns when the GUI window closes or the
    /// bus shuts down.
    pub fn run(&mut self) {
        log::info!("sync controller started");
        loop {
            if self.process_pending_bus_messages() {
                break;
            }
            self.poll_remote_if_due();
            self.verify_advance_if_due();
            self.tick_visualizer_if_due();
            std::thread::sleep(LOOP_SLEEP);
        }
        self.shutdown();
        log::info!("sync controller stopped");
    }

    /// Drains pending bus messages; true means stop the loop.
    fn process_pending_bus_messages(&mut self) -> bool {
        loop {
            match self.bus_consumer.try_recv() {
                Ok(Message::Gui(GuiMessage::WindowClosed)) => return true,
                Ok(Message::Gui(message)) => self.handle_gui_message(message),
                Ok(Message::Session(message)) => self.handle_session_message(message),
                Ok(Message::Playlist(PlaylistMessage::TracksIndexed { entries })) => {
                    for entry in entries.iter() {
                        self.resolver
                            .register(&entry.title, &entry.artist, &entry.uri);
                    }
                }
                Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                    self.sync_config = config.sync.clone();
                    self.visualizer_config = config.visualizer.clone();
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("sync controller lagged, skipped {skipped} bus messages");
                }
                Err(TryRecvError::Closed) => return true,
            }
        }
    }

    fn handle_gui_message(&mut self, message: GuiMessage) {
        match message {
            GuiMessage::TrackChanged {
                track,
                index,
                playlist_len,
            } => self.on_track_changed(track, index, playlist_len),
            GuiMessage::AudioTimeUpdate { position_ms } => self.on_local_tick(position_ms),
            GuiMessage::SeekBarInput { fraction } => self.on_seek_bar(fraction),
            GuiMessage::PlayPressed => self.on_play_pressed(),
            GuiMessage::PausePressed => self.on_pause_pressed(),
            GuiMessage::NextPressed => {
                if self.state.last_played_uri.is_some() {
                    self.send_shell(ShellCommand::AdvanceToNextTrack);
                }
            }
            GuiMessage::PreviousPressed => self.on_previous_pressed(),
            GuiMessage::VolumeChanged { volume } => {
                if self.state.last_played_uri.is_some() {
                    if let Err(err) = self.remote.set_volume(volume) {
                        log::warn!("volume update failed: {err}");
                    }
                }
            }
            GuiMessage::ConnectRequested => {
                match self.session.ensure_ready(self.ensure_ready_timeout) {
                    Ok(device_id) => log::info!("session ready on device {device_id}"),
                    Err(err) => log::warn!("connect request failed: {err}"),
                }
            }
            GuiMessage::WindowMinimized => self.send_shell(ShellCommand::MinimizeWindow),
            // Library loads belong to the playlist loader.
            GuiMessage::RequestPlaylists
            | GuiMessage::LoadPlaylist { .. }
            | GuiMessage::LoadLikedTracks => {}
            GuiMessage::WindowClosed => {}
        }
    }

    fn handle_session_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::EngineStateChanged(state) => self.apply_remote_state(&state),
            SessionMessage::DeviceLost { device_id } => {
                log::warn!("playback device {device_id} lost");
                if self.state.is_remote_playing {
                    self.enter_paused();
                }
            }
            SessionMessage::AuthenticationRequired => {
                if self.state.is_remote_playing {
                    self.enter_paused();
                }
            }
            SessionMessage::EngineError { message } => {
                log::warn!("engine error: {message}");
            }
            SessionMessage::DeviceReady { device_id } => {
                log::info!("playback device ready: {device_id}");
            }
        }
    }

    // --- track change ---------------------------------------------------

    fn on_track_changed(&mut self, track: GuiTrack, index: usize, playlist_len: usize) {
        if self.state.resuming {
            // A resume sequence re-fires the GUI's track-change callback.
            return;
        }
        self.state.playlist_index = index;
        self.state.playlist_len = playlist_len;
        self.state.seek_in_flight = false;
        self.state.playback_starting_until = None;
        self.resume_verify_at = None;

        self.set_phase(SyncPhase::Resolving);
        let (title, artist) = track.label();
        let resolved_uri = match &track {
            // Local rows never route remotely, even if their metadata
            // collides with a registered identity.
            GuiTrack::Local(_) => None,
            GuiTrack::RemoteBacked(remote) => self
                .resolver
                .resolve(title, artist)
                .map(str::to_string)
                .or_else(|| (!remote.uri.is_empty()).then(|| remote.uri.clone())),
        };
        let Some(uri) = resolved_uri else {
            // Unresolved means a genuinely local track; get out of its way.
            self.stop_remote_involvement();
            return;
        };

        let duration_ms = track.duration_ms();
        if self.state.last_played_uri.as_deref() == Some(uri.as_str())
            && self.state.is_remote_playing
        {
            // Same track re-selected; refresh the placeholder binding but
            // do not restart remote playback.
            self.bind_placeholder(&uri, duration_ms);
            self.set_phase(SyncPhase::Playing);
            return;
        }

        let title = title.to_string();
        let artist = artist.to_string();
        self.start_remote_track(&uri, &title, &artist, duration_ms);
    }

    fn start_remote_track(&mut self, uri: &str, title: &str, artist: &str, duration_ms: u64) {
        self.set_phase(SyncPhase::Transferring);
        self.send_shell(ShellCommand::PauseLocalAudio);

        let device_id = match self.session.ensure_ready(self.ensure_ready_timeout) {
            Ok(device_id) => device_id,
            Err(err) => {
                log::warn!("session not ready for playback: {err}");
                self.set_phase(SyncPhase::Error);
                return;
            }
        };

        self.set_phase(SyncPhase::Starting);
        match self.play_with_retry(&device_id, uri, 0) {
            Ok(()) => {}
            Err(RemoteApiError::TrackUnavailable) => {
                // Region-locked or removed; skip without surfacing an
                // error in the retro UI.
                log::info!("track unavailable, skipping: {uri}");
                self.send_shell(ShellCommand::AdvanceToNextTrack);
                self.set_phase(SyncPhase::Idle);
                return;
            }
            Err(err) => {
                log::warn!("remote play failed: {err}");
                self.set_phase(SyncPhase::Error);
                return;
            }
        }

        self.bind_placeholder(uri, duration_ms);
        if self.sync_config.settle_delay_ms > 0 {
            // Give the engine a moment to actually begin before the local
            // clock starts counting.
            std::thread::sleep(Duration::from_millis(self.sync_config.settle_delay_ms));
        }
        self.send_shell(ShellCommand::ResumeLocalAudio { offset_ms: 0 });

        self.state.last_played_uri = Some(uri.to_string());
        self.state.current_track_duration_ms = duration_ms;
        self.state.last_known_remote_position_ms = 0;
        self.state.is_remote_playing = true;
        self.state.seek_in_flight = false;
        self.state.playback_starting_until =
            Some(Instant::now() + Duration::from_millis(self.sync_config.start_suppression_ms));
        self.set_phase(SyncPhase::Playing);
        self.start_visualizer();
        self.send_shell(ShellCommand::SetNowPlayingTitle {
            title: Some(format!("{title} - {artist}")),
        });
        self.send_shell(ShellCommand::SetPlayIndicator { playing: true });
        self.last_poll_at = Instant::now();
    }

    /// Issues the play request, re-transferring once on a dead session.
    fn play_with_retry(
        &self,
        device_id: &str,
        uri: &str,
        position_ms: u64,
    ) -> Result<(), RemoteApiError> {
        match self.remote.play_uri(device_id, uri, position_ms) {
            Err(RemoteApiError::NoActiveSession) => {
                log::info!("no active session, re-transferring to {device_id}");
                self.remote.transfer_playback(device_id, false)?;
                self.remote.play_uri(device_id, uri, position_ms)
            }
            other => other,
        }
    }

    fn bind_placeholder(&mut self, uri: &str, duration_ms: u64) {
        let asset = self.placeholders.get_or_create(uri, duration_ms);
        self.send_shell(ShellCommand::BindPlaceholder {
            uri: asset.uri.clone(),
            duration_ms: asset.duration_ms,
            wav_base64: asset.wav_base64(),
        });
    }

    fn stop_remote_involvement(&mut self) {
        if self.state.is_remote_playing {
            if let Err(err) = self.remote.pause() {
                log::warn!("pause before local handoff failed: {err}");
            }
        }
        self.state.is_remote_playing = false;
        self.state.last_played_uri = None;
        self.state.last_known_remote_position_ms = 0;
        self.set_phase(SyncPhase::Idle);
        self.stop_visualizer();
        self.send_shell(ShellCommand::SetNowPlayingTitle { title: None });
        self.send_shell(ShellCommand::SetPlayIndicator { playing: false });
    }

    // --- drift reconciliation -------------------------------------------

    fn on_local_tick(&mut self, local_position_ms: u64) {
        if self.state.phase != SyncPhase::Playing || !self.state.is_remote_playing {
            return;
        }
        if self.state.seek_in_flight || self.state.resuming || self.state.in_start_window() {
            return;
        }
        let remote_position_ms = self.state.last_known_remote_position_ms;
        let drift_ms = local_position_ms.abs_diff(remote_position_ms);
        let tolerance_ms = if local_position_ms < self.sync_config.near_start_window_ms {
            self.sync_config.near_start_drift_tolerance_ms
        } else {
            self.sync_config.drift_tolerance_ms
        };
        if drift_ms <= tolerance_ms {
            return;
        }

        log::debug!(
            "correcting drift: local {local_position_ms}ms, remote {remote_position_ms}ms"
        );
        self.state.seek_in_flight = true;
        match self.remote.seek(local_position_ms) {
            Ok(()) => {
                // Stays in flight until the next poll confirms it landed.
                self.state.last_known_remote_position_ms = local_position_ms;
                let _ = self.bus_producer.send(Message::Sync(
                    crate::protocol::SyncMessage::DriftCorrected {
                        local_ms: local_position_ms,
                        remote_ms: remote_position_ms,
                    },
                ));
            }
            Err(err) => {
                log::warn!("drift-correction seek failed: {err}");
                self.state.seek_in_flight = false;
            }
        }
    }

    fn on_seek_bar(&mut self, fraction: f32) {
        if !self.state.is_remote_playing || self.state.current_track_duration_ms == 0 {
            return;
        }
        if self.state.seek_in_flight || self.state.resuming {
            return;
        }
        let target_ms =
            (fraction.clamp(0.0, 1.0) as f64 * self.state.current_track_duration_ms as f64) as u64;
        if self.state.in_start_window() && target_ms <= self.sync_config.seek_ignore_window_ms {
            // The bar snaps toward zero while the engine is still settling;
            // honoring that would restart the track.
            return;
        }
        self.state.seek_in_flight = true;
        match self.remote.seek(target_ms) {
            Ok(()) => {
                self.state.last_known_remote_position_ms = target_ms;
            }
            Err(err) => {
                log::warn!("seek-bar seek failed: {err}");
                self.state.seek_in_flight = false;
            }
        }
    }

    // --- transport buttons ----------------------------------------------

    fn on_play_pressed(&mut self) {
        if self.state.resuming || self.state.is_remote_playing {
            return;
        }
        let Some(uri) = self.state.last_played_uri.clone() else {
            return;
        };
        self.state.resuming = true;
        let resumed = self.resume_remote_playback(&uri);
        self.state.resuming = false;
        if resumed {
            self.state.is_remote_playing = true;
            self.state.playback_starting_until = Some(
                Instant::now() + Duration::from_millis(self.sync_config.start_suppression_ms),
            );
            self.set_phase(SyncPhase::Playing);
            self.start_visualizer();
            self.send_shell(ShellCommand::SetPlayIndicator { playing: true });
        }
    }

    /// Resume after an external or local pause: re-activate the device,
    /// let the transfer settle, restart at the last known position, then
    /// bring the local clock along.
    fn resume_remote_playback(&mut self, uri: &str) -> bool {
        let device_id = match self.session.ensure_ready(self.ensure_ready_timeout) {
            Ok(device_id) => device_id,
            Err(err) => {
                log::warn!("resume failed, session not ready: {err}");
                return false;
            }
        };
        if let Err(err) = self.remote.transfer_playback(&device_id, false) {
            log::warn!("resume transfer failed: {err}");
        }
        if self.sync_config.resume_transfer_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.sync_config.resume_transfer_delay_ms));
        }
        let position_ms = self.state.last_known_remote_position_ms;
        if let Err(err) = self.play_with_retry(&device_id, uri, position_ms) {
            log::warn!("resume play failed: {err}");
            return false;
        }
        if self.sync_config.resume_play_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.sync_config.resume_play_delay_ms));
        }
        self.send_shell(ShellCommand::ResumeLocalAudio {
            offset_ms: position_ms,
        });
        true
    }

    fn on_pause_pressed(&mut self) {
        if !self.state.is_remote_playing {
            return;
        }
        if let Err(err) = self.remote.pause() {
            log::warn!("remote pause failed: {err}");
        }
        self.state.is_remote_playing = false;
        self.set_phase(SyncPhase::Paused);
        self.stop_visualizer();
        self.send_shell(ShellCommand::SetPlayIndicator { playing: false });
    }

    fn on_previous_pressed(&mut self) {
        if !self.state.is_remote_playing {
            return;
        }
        // Restart the current track on both clocks.
        self.state.seek_in_flight = true;
        match self.remote.seek(0) {
            Ok(()) => {
                self.state.last_known_remote_position_ms = 0;
                self.send_shell(ShellCommand::ResumeLocalAudio { offset_ms: 0 });
            }
            Err(err) => {
                log::warn!("restart seek failed: {err}");
                self.state.seek_in_flight = false;
            }
        }
    }

    // --- remote polling -------------------------------------------------

    fn poll_remote_if_due(&mut self) {
        if self.state.phase != SyncPhase::Playing || !self.state.is_remote_playing {
            return;
        }
        if self.last_poll_at.elapsed() < Duration::from_millis(self.sync_config.poll_interval_ms) {
            return;
        }
        self.last_poll_at = Instant::now();
        self.poll_remote_now();
    }

    fn poll_remote_now(&mut self) {
        match self.remote.playback_state() {
            Ok(Some(state)) => self.apply_remote_state(&state),
            Ok(None) => {
                // Nothing playing anywhere on the account: our device fell
                // off. Mirror a pause and let the next start reconnect.
                log::warn!("no active remote session, pausing locally");
                self.session.invalidate_device();
                self.enter_paused();
            }
            Err(err) => {
                // Transient; state is left untouched and the next poll
                // self-corrects.
                log::debug!("remote state poll failed: {err}");
            }
        }
    }

    /// Adopts a confirmed remote state as ground truth.
    fn apply_remote_state(&mut self, remote_state: &EngineState) {
        if !self.state.is_remote_playing {
            self.mirror_external_resume(remote_state);
            return;
        }
        if self.state.seek_in_flight {
            // The poll that follows our own seek confirms it landed;
            // adoption resumes on the next one.
            self.state.seek_in_flight = false;
            return;
        }
        self.state.last_known_remote_position_ms = remote_state.position_ms;
        if remote_state.duration_ms > 0 {
            self.state.current_track_duration_ms = remote_state.duration_ms;
        }
        if self.state.phase != SyncPhase::Playing {
            // TrackEnded has already dispatched its advance; further
            // near-end states must not advance again before the next
            // track change arrives.
            return;
        }

        if remote_state.paused && !self.state.resuming && !self.state.in_start_window() {
            log::info!("remote playback paused externally, mirroring");
            self.enter_paused();
            return;
        }

        let duration_ms = self.state.current_track_duration_ms;
        if duration_ms > 0
            && remote_state.position_ms + self.sync_config.track_end_buffer_ms >= duration_ms
        {
            self.on_track_ended();
        }
    }

    /// Another client un-pausing the session shows up as an unpaused
    /// state while we sit in Paused; bring the local side back along.
    fn mirror_external_resume(&mut self, remote_state: &EngineState) {
        if remote_state.paused
            || self.state.phase != SyncPhase::Paused
            || self.state.resuming
            || self.state.last_played_uri.is_none()
        {
            return;
        }
        log::info!("remote playback resumed externally, mirroring");
        self.state.is_remote_playing = true;
        self.state.last_known_remote_position_ms = remote_state.position_ms;
        self.state.seek_in_flight = false;
        self.set_phase(SyncPhase::Playing);
        self.start_visualizer();
        self.send_shell(ShellCommand::ResumeLocalAudio {
            offset_ms: remote_state.position_ms,
        });
        self.send_shell(ShellCommand::SetPlayIndicator { playing: true });
        self.last_poll_at = Instant::now();
    }

    fn on_track_ended(&mut self) {
        let has_next = self.state.playlist_index + 1 < self.state.playlist_len;
        self.set_phase(SyncPhase::TrackEnded);
        if has_next {
            log::info!("track ended, advancing playlist");
            self.send_shell(ShellCommand::AdvanceToNextTrack);
            // The advance replays through the GUI; verify shortly after
            // that the engine did not stall silently paused.
            self.resume_verify_at = Some(
                Instant::now() + Duration::from_millis(self.sync_config.resume_verify_delay_ms),
            );
        } else {
            log::info!("playlist finished");
            self.state.is_remote_playing = false;
            self.state.last_played_uri = None;
            self.set_phase(SyncPhase::Idle);
            self.stop_visualizer();
            self.send_shell(ShellCommand::PauseLocalAudio);
            self.send_shell(ShellCommand::SetNowPlayingTitle { title: None });
            self.send_shell(ShellCommand::SetPlayIndicator { playing: false });
        }
    }

    fn verify_advance_if_due(&mut self) {
        let Some(verify_at) = self.resume_verify_at else {
            return;
        };
        if Instant::now() < verify_at {
            return;
        }
        self.resume_verify_at = None;
        if self.state.phase != SyncPhase::Playing || !self.state.is_remote_playing {
            return;
        }
        let Some(device_id) = self.session.device_id() else {
            return;
        };
        match self.remote.playback_state() {
            Ok(Some(state)) if state.paused => {
                log::info!("auto-advanced track stalled paused, resuming");
                if let Err(err) = self.remote.resume(&device_id) {
                    log::warn!("stall resume failed: {err}");
                }
            }
            _ => {}
        }
    }

    fn enter_paused(&mut self) {
        self.state.is_remote_playing = false;
        self.set_phase(SyncPhase::Paused);
        self.stop_visualizer();
        self.send_shell(ShellCommand::PauseLocalAudio);
        self.send_shell(ShellCommand::SetPlayIndicator { playing: false });
    }

    // --- visualizer -----------------------------------------------------

    fn start_visualizer(&mut self) {
        self.visualizer_mode = VisualizerMode::Running;
        self.last_visualizer_tick_at = Instant::now();
    }

    fn stop_visualizer(&mut self) {
        if self.visualizer_mode == VisualizerMode::Running {
            self.visualizer_mode = VisualizerMode::Decaying;
        }
    }

    fn tick_visualizer_if_due(&mut self) {
        if self.visualizer_mode == VisualizerMode::Stopped {
            return;
        }
        let interval = Duration::from_millis(self.visualizer_config.tick_interval_ms);
        if self.last_visualizer_tick_at.elapsed() < interval {
            return;
        }
        self.last_visualizer_tick_at = Instant::now();
        let frame = match self.visualizer_mode {
            VisualizerMode::Running => self.visualizer.tick(true),
            VisualizerMode::Decaying => self.visualizer.decay_tick(),
            VisualizerMode::Stopped => return,
        };
        self.send_shell(ShellCommand::VisualizerFrame { frame });
        if self.visualizer_mode == VisualizerMode::Decaying && self.visualizer.is_settled() {
            // The settled frame above was the rest frame; stop ticking.
            self.visualizer_mode = VisualizerMode::Stopped;
        }
    }

    // --- lifecycle ------------------------------------------------------

    fn shutdown(&mut self) {
        if self.state.is_remote_playing {
            if let Err(err) = self.remote.pause() {
                log::warn!("pause on shutdown failed: {err}");
            }
        }
        self.placeholders.clear();
    }

    fn set_phase(&mut self, phase: SyncPhase) {
        if self.state.phase == phase {
            return;
        }
        log::debug!("sync phase {:?} -> {:?}", self.state.phase, phase);
        self.state.phase = phase;
        let _ = self
            .bus_producer
            .send(Message::Sync(crate::protocol::SyncMessage::PhaseChanged(
                phase,
            )));
    }

    fn send_shell(&self, command: ShellCommand) {
        let _ = self.bus_producer.send(Message::Shell(command));
    }
}
