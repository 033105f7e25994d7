//! Silent placeholder WAV synthesis.
//!
//! The GUI's audio element needs a real decodable file whose duration
//! matches the remote track, so its own progress clock runs at the right
//! rate. Mono 8 kHz 8-bit PCM keeps the assets tiny (8 bytes per
//! millisecond) and makes the sample count an exact function of the
//! duration.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;

const SAMPLE_RATE: u32 = 8_000;
const SAMPLES_PER_MS: u64 = SAMPLE_RATE as u64 / 1_000;
/// Midpoint of the unsigned 8-bit PCM range, i.e. silence.
const SILENCE_BYTE: u8 = 0x80;

/// Builds a silent WAV lasting exactly `duration_ms`.
///
/// Valid for any duration including zero; a zero-duration asset is a
/// well-formed WAV with an empty data chunk.
pub fn silent_wav(duration_ms: u64) -> Vec<u8> {
    let data_len = (duration_ms * SAMPLES_PER_MS) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes()); // byte rate
    bytes.extend_from_slice(&1u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&8u16.to_le_bytes()); // bits per sample

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, SILENCE_BYTE);

    bytes
}

/// Duration a decoder would measure for a `silent_wav` output.
pub fn measured_duration_ms(wav: &[u8]) -> u64 {
    let data_len = wav.len().saturating_sub(44) as u64;
    data_len / SAMPLES_PER_MS
}

/// One cached placeholder, shared between the cache and in-flight binds.
#[derive(Debug, Clone)]
pub struct PlaceholderAsset {
    pub uri: String,
    pub duration_ms: u64,
    pub bytes: Arc<Vec<u8>>,
}

impl PlaceholderAsset {
    /// Encoding used to carry the asset over the shell bridge.
    pub fn wav_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes.as_slice())
    }
}

/// URI-keyed cache of placeholder assets.
#[derive(Debug, Default)]
pub struct PlaceholderCache {
    assets_by_uri: HashMap<String, Arc<PlaceholderAsset>>,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached asset for `uri`, synthesizing it on first use.
    pub fn get_or_create(&mut self, uri: &str, duration_ms: u64) -> Arc<PlaceholderAsset> {
        if let Some(asset) = self.assets_by_uri.get(uri) {
            return Arc::clone(asset);
        }
        let asset = Arc::new(PlaceholderAsset {
            uri: uri.to_string(),
            duration_ms,
            bytes: Arc::new(silent_wav(duration_ms)),
        });
        self.assets_by_uri.insert(uri.to_string(), Arc::clone(&asset));
        asset
    }

    /// Releases every cached asset; used on shutdown.
    pub fn clear(&mut self) {
        self.assets_by_uri.clear();
    }

    pub fn len(&self) -> usize {
        self.assets_by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets_by_uri.is_empty()
    }
}
