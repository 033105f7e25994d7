//! Synthetic spectrum visualizer.
//!
//! No audio is analyzed anywhere in this process; the bars are animated
//! from nothing but the boolean playing signal. Skewed random targets,
//! exponential smoothing, and peak-hold caps make the motion read as a
//! live spectrum in the retro GUI.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::config::VisualizerConfig;

pub const CHANNEL_COUNT: usize = 20;

/// Amplitudes below this are snapped to zero so the decay tail is bounded.
const REST_EPSILON: f32 = 0.004;

/// One rendered frame; values are 0.0..=1.0 of the bar height.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VisualizerFrame {
    pub amplitudes: [f32; CHANNEL_COUNT],
    pub peaks: [f32; CHANNEL_COUNT],
}

impl VisualizerFrame {
    pub fn rest() -> Self {
        Self {
            amplitudes: [0.0; CHANNEL_COUNT],
            peaks: [0.0; CHANNEL_COUNT],
        }
    }
}

/// Bar animation state. `tick` drives active playback frames; once
/// playback stops, `decay_tick` runs the bars down to rest in a bounded
/// number of ticks.
pub struct Visualizer {
    amplitudes: [f32; CHANNEL_COUNT],
    peaks: [f32; CHANNEL_COUNT],
    hold_ticks: [u32; CHANNEL_COUNT],
    rng: StdRng,
    smoothing: f32,
    peak_hold_ticks: u32,
    peak_drop_per_tick: f32,
}

impl Visualizer {
    pub fn new(config: &VisualizerConfig) -> Self {
        let mut seed = [0u8; 32];
        let _ = getrandom::fill(&mut seed);
        Self::with_rng(config, StdRng::from_seed(seed))
    }

    fn with_rng(config: &VisualizerConfig, rng: StdRng) -> Self {
        Self {
            amplitudes: [0.0; CHANNEL_COUNT],
            peaks: [0.0; CHANNEL_COUNT],
            hold_ticks: [0; CHANNEL_COUNT],
            rng,
            smoothing: config.smoothing,
            peak_hold_ticks: config.peak_hold_ticks,
            // The drop speed is expressed in pixels per tick against the
            // canvas height; normalize it to the 0..=1 bar scale.
            peak_drop_per_tick: config.peak_drop_speed / config.canvas_height_px.max(1) as f32,
        }
    }

    /// Advances one animation tick and returns the frame to render.
    pub fn tick(&mut self, playing: bool) -> VisualizerFrame {
        for channel in 0..CHANNEL_COUNT {
            let draw: f32 = self.rng.random();
            // Squaring the draw biases bars low, with occasional spikes.
            let target = if playing {
                draw * draw * 0.9 + 0.1
            } else {
                draw * 0.05
            };
            self.step_channel(channel, target);
        }
        self.frame()
    }

    /// One tick of the post-stop tail: every bar falls toward zero.
    pub fn decay_tick(&mut self) -> VisualizerFrame {
        for channel in 0..CHANNEL_COUNT {
            self.step_channel(channel, 0.0);
        }
        self.frame()
    }

    /// True once every bar and peak has reached rest.
    pub fn is_settled(&self) -> bool {
        self.amplitudes.iter().all(|value| *value == 0.0)
            && self.peaks.iter().all(|value| *value == 0.0)
    }

    pub fn reset(&mut self) {
        self.amplitudes = [0.0; CHANNEL_COUNT];
        self.peaks = [0.0; CHANNEL_COUNT];
        self.hold_ticks = [0; CHANNEL_COUNT];
    }

    fn step_channel(&mut self, channel: usize, target: f32) {
        let amplitude = &mut self.amplitudes[channel];
        *amplitude += (target - *amplitude) * self.smoothing;
        if *amplitude < REST_EPSILON {
            *amplitude = 0.0;
        }

        let peak = &mut self.peaks[channel];
        if *amplitude >= *peak {
            *peak = *amplitude;
            self.hold_ticks[channel] = self.peak_hold_ticks;
        } else if self.hold_ticks[channel] > 0 {
            self.hold_ticks[channel] -= 1;
        } else {
            *peak = (*peak - self.peak_drop_per_tick).max(*amplitude).max(0.0);
        }
    }

    fn frame(&self) -> VisualizerFrame {
        VisualizerFrame {
            amplitudes: self.amplitudes,
            peaks: self.peaks,
        }
    }
}
