//! In-browser playback engine driven through the shell's local bridge.
//!
//! The playback SDK itself runs inside the desktop shell's hidden web
//! view; this side only issues connect/disconnect and drains the event
//! queue the shell accumulates for us.

use std::time::Duration;

use serde_json::Value;

use crate::protocol::EngineState;

/// Events emitted by the playback engine, as forwarded over the bridge.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The engine registered a playback device with the service.
    Ready { device_id: String },
    /// A previously ready device dropped off.
    NotReady { device_id: String },
    StateChanged(EngineState),
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },
    PlaybackError { message: String },
}

/// The playback-engine seam the session manager drives.
pub trait PlayerEngine: Send {
    /// Starts (or restarts) the engine. `Ok(true)` means the engine
    /// accepted the connection attempt; readiness arrives later as an
    /// [`EngineEvent::Ready`].
    fn connect(&mut self) -> Result<bool, String>;

    fn disconnect(&mut self);

    /// Drains events accumulated since the last poll.
    fn poll_events(&mut self) -> Result<Vec<EngineEvent>, String>;
}

/// Builds a fresh engine instance; used when a stale engine cannot be
/// reconnected.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn PlayerEngine> + Send + Sync>;

/// `PlayerEngine` implementation over the shell bridge's player endpoints.
pub struct BridgeEngine {
    http_client: ureq::Agent,
    bridge_base_url: String,
    device_name: String,
}

impl BridgeEngine {
    pub fn new(bridge_base_url: &str, device_name: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .timeout_write(Duration::from_secs(10))
            .build();
        Self {
            http_client,
            bridge_base_url: bridge_base_url.trim().trim_end_matches('/').to_string(),
            device_name: device_name.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.bridge_base_url)
    }
}

impl PlayerEngine for BridgeEngine {
    fn connect(&mut self) -> Result<bool, String> {
        let response = self
            .http_client
            .post(&self.url("/bridge/player/connect"))
            .send_json(serde_json::json!({ "device_name": self.device_name }))
            .map_err(|err| format!("engine connect request failed: {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("engine connect response parse failed: {err}"))?;
        Ok(parsed
            .get("connected")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn disconnect(&mut self) {
        if let Err(err) = self
            .http_client
            .post(&self.url("/bridge/player/disconnect"))
            .send_string("")
        {
            log::warn!("engine disconnect request failed: {err}");
        }
    }

    fn poll_events(&mut self) -> Result<Vec<EngineEvent>, String> {
        let response = self
            .http_client
            .get(&self.url("/bridge/player/events"))
            .call()
            .map_err(|err| format!("engine event poll failed: {err}"))?;
        let events: Vec<EngineEvent> = response
            .into_json()
            .map_err(|err| format!("engine event parse failed: {err}"))?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_events_deserialize_from_bridge_payloads() {
        let body = r#"[
            {"type": "ready", "device_id": "dev-1"},
            {"type": "state_changed", "paused": false, "position_ms": 1200,
             "duration_ms": 180000, "track_uri": "remote:track:x"},
            {"type": "authentication_error", "message": "token expired"}
        ]"#;
        let events: Vec<EngineEvent> = serde_json::from_str(body).expect("events should parse");
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], EngineEvent::Ready { device_id } if device_id == "dev-1"));
        match &events[1] {
            EngineEvent::StateChanged(state) => {
                assert_eq!(state.position_ms, 1_200);
                assert_eq!(state.track_uri.as_deref(), Some("remote:track:x"));
            }
            other => panic!("expected state change, got {other:?}"),
        }
        assert!(matches!(&events[2], EngineEvent::AuthenticationError { .. }));
    }
}
