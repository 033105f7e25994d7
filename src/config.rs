//! Persistent application configuration model and defaults.
//!
//! The drift tolerances and settle delays in [`SyncConfig`] are empirically
//! tuned values carried over from field use; they are configuration rather
//! than constants so deployments can adjust them without a rebuild.

/// Root configuration persisted to `ghostamp.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Local relay/auth-proxy endpoints.
    pub relay: RelayConfig,
    #[serde(default)]
    /// Remote playback engine and Web API endpoints.
    pub remote: RemoteConfig,
    #[serde(default)]
    /// Clock reconciliation tuning.
    pub sync: SyncConfig,
    #[serde(default)]
    /// Synthetic visualizer tuning.
    pub visualizer: VisualizerConfig,
}

/// Local relay service endpoints and HTTP timeouts.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Remote engine bridge and Web API configuration.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Shell bridge hosting the in-browser playback engine.
    #[serde(default = "default_bridge_base_url")]
    pub bridge_base_url: String,
    /// Device name announced to the streaming service.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Bound wait for engine/SDK initialization; timing out is reported
    /// distinctly from a rejected initialization.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

/// Tuning knobs for the dual-clock reconciliation loop.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SyncConfig {
    /// Drift tolerance while the local clock is inside the near-start window.
    #[serde(default = "default_near_start_drift_tolerance_ms")]
    pub near_start_drift_tolerance_ms: u64,
    /// Drift tolerance for the rest of the track.
    #[serde(default = "default_drift_tolerance_ms")]
    pub drift_tolerance_ms: u64,
    /// How far into the track the near-start tolerance applies.
    #[serde(default = "default_near_start_window_ms")]
    pub near_start_window_ms: u64,
    /// Seek suppression right after a playback start, absorbing the remote
    /// engine's own startup jitter.
    #[serde(default = "default_start_suppression_ms")]
    pub start_suppression_ms: u64,
    /// Pause between the remote play request and resuming local audio.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after re-activating the device during a resume.
    #[serde(default = "default_resume_transfer_delay_ms")]
    pub resume_transfer_delay_ms: u64,
    /// Pause after the resume play request before local audio restarts.
    #[serde(default = "default_resume_play_delay_ms")]
    pub resume_play_delay_ms: u64,
    /// Remote position poll period while playing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Remote position within this buffer of the duration counts as ended.
    #[serde(default = "default_track_end_buffer_ms")]
    pub track_end_buffer_ms: u64,
    /// Seek-bar nudges landing this close to the start are ignored while the
    /// engine's own position may still be overshooting.
    #[serde(default = "default_seek_ignore_window_ms")]
    pub seek_ignore_window_ms: u64,
    /// Delay before verifying that an auto-advanced track actually resumed.
    #[serde(default = "default_resume_verify_delay_ms")]
    pub resume_verify_delay_ms: u64,
}

/// Synthetic visualizer physics parameters.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VisualizerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Exponential smoothing factor toward each tick's target amplitude.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Ticks a fresh peak holds before it starts falling.
    #[serde(default = "default_peak_hold_ticks")]
    pub peak_hold_ticks: u32,
    /// Peak fall rate in pixels per tick.
    #[serde(default = "default_peak_drop_speed")]
    pub peak_drop_speed: f32,
    /// Height of the spectrum canvas the drop rate is expressed against.
    #[serde(default = "default_canvas_height_px")]
    pub canvas_height_px: u32,
}

fn default_relay_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_bridge_base_url() -> String {
    "http://localhost:3789".to_string()
}

fn default_device_name() -> String {
    "Ghostamp Desktop".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    15_000
}

fn default_init_timeout_ms() -> u64 {
    10_000
}

fn default_near_start_drift_tolerance_ms() -> u64 {
    2_000
}

fn default_drift_tolerance_ms() -> u64 {
    2_500
}

fn default_near_start_window_ms() -> u64 {
    5_000
}

fn default_start_suppression_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_resume_transfer_delay_ms() -> u64 {
    300
}

fn default_resume_play_delay_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_track_end_buffer_ms() -> u64 {
    500
}

fn default_seek_ignore_window_ms() -> u64 {
    1_500
}

fn default_resume_verify_delay_ms() -> u64 {
    1_000
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_smoothing() -> f32 {
    0.3
}

fn default_peak_hold_ticks() -> u32 {
    3
}

fn default_peak_drop_speed() -> f32 {
    0.4
}

fn default_canvas_height_px() -> u32 {
    16
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            bridge_base_url: default_bridge_base_url(),
            device_name: default_device_name(),
            init_timeout_ms: default_init_timeout_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            near_start_drift_tolerance_ms: default_near_start_drift_tolerance_ms(),
            drift_tolerance_ms: default_drift_tolerance_ms(),
            near_start_window_ms: default_near_start_window_ms(),
            start_suppression_ms: default_start_suppression_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            resume_transfer_delay_ms: default_resume_transfer_delay_ms(),
            resume_play_delay_ms: default_resume_play_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            track_end_buffer_ms: default_track_end_buffer_ms(),
            seek_ignore_window_ms: default_seek_ignore_window_ms(),
            resume_verify_delay_ms: default_resume_verify_delay_ms(),
        }
    }
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            smoothing: default_smoothing(),
            peak_hold_ticks: default_peak_hold_ticks(),
            peak_drop_speed: default_peak_drop_speed(),
            canvas_height_px: default_canvas_height_px(),
        }
    }
}

/// Clamps every tunable into a range the runtime can tolerate.
pub fn sanitize_config(config: Config) -> Config {
    let sync = SyncConfig {
        near_start_drift_tolerance_ms: config.sync.near_start_drift_tolerance_ms.clamp(250, 10_000),
        drift_tolerance_ms: config.sync.drift_tolerance_ms.clamp(250, 10_000),
        near_start_window_ms: config.sync.near_start_window_ms.clamp(0, 60_000),
        start_suppression_ms: config.sync.start_suppression_ms.clamp(0, 10_000),
        settle_delay_ms: config.sync.settle_delay_ms.min(5_000),
        resume_transfer_delay_ms: config.sync.resume_transfer_delay_ms.min(5_000),
        resume_play_delay_ms: config.sync.resume_play_delay_ms.min(5_000),
        poll_interval_ms: config.sync.poll_interval_ms.clamp(250, 10_000),
        track_end_buffer_ms: config.sync.track_end_buffer_ms.clamp(100, 5_000),
        seek_ignore_window_ms: config.sync.seek_ignore_window_ms.min(10_000),
        resume_verify_delay_ms: config.sync.resume_verify_delay_ms.clamp(100, 10_000),
    };
    let visualizer = VisualizerConfig {
        tick_interval_ms: config.visualizer.tick_interval_ms.clamp(16, 250),
        smoothing: config.visualizer.smoothing.clamp(0.05, 1.0),
        peak_hold_ticks: config.visualizer.peak_hold_ticks.min(60),
        peak_drop_speed: config.visualizer.peak_drop_speed.clamp(0.05, 8.0),
        canvas_height_px: config.visualizer.canvas_height_px.clamp(4, 256),
    };
    let remote = RemoteConfig {
        init_timeout_ms: config.remote.init_timeout_ms.clamp(1_000, 60_000),
        ..config.remote
    };
    let relay = RelayConfig {
        connect_timeout_ms: config.relay.connect_timeout_ms.clamp(500, 30_000),
        read_timeout_ms: config.relay.read_timeout_ms.clamp(1_000, 120_000),
        ..config.relay
    };
    Config {
        relay,
        remote,
        sync,
        visualizer,
    }
}
