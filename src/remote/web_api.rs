//! Remote Web API client implementation over `ureq`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::relay_client::{TokenError, TokenSource};
use crate::remote::{RemoteApiError, RemoteController};
use crate::protocol::EngineState;

fn map_token_error(err: TokenError) -> RemoteApiError {
    match err {
        TokenError::NotAuthenticated => RemoteApiError::NotAuthenticated,
        TokenError::Transport(message) => RemoteApiError::Transport(message),
    }
}

/// Web API client; a fresh token is fetched from the relay before every
/// request so refresh timing stays the relay's problem.
pub struct WebApiClient {
    http_client: ureq::Agent,
    token_source: Arc<dyn TokenSource>,
    api_base_url: String,
}

impl WebApiClient {
    pub fn new(api_base_url: &str, token_source: Arc<dyn TokenSource>) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            token_source,
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url)
    }

    fn token(&self) -> Result<String, RemoteApiError> {
        self.token_source.fresh_token().map_err(map_token_error)
    }

    fn refreshed_token(&self) -> Result<String, RemoteApiError> {
        self.token_source.refreshed_token().map_err(map_token_error)
    }

    fn map_status(status: u16, playing_request: bool) -> RemoteApiError {
        match status {
            401 => RemoteApiError::NotAuthenticated,
            403 if playing_request => RemoteApiError::TrackUnavailable,
            404 => RemoteApiError::NoActiveSession,
            other => RemoteApiError::Http(other),
        }
    }

    /// Sends one player verb. A 401 gets a single retry after forcing a
    /// token refresh; a second 401 surfaces as `NotAuthenticated`.
    fn send_verb(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        playing_request: bool,
    ) -> Result<(), RemoteApiError> {
        let token = self.token()?;
        match self.send_verb_with(&token, method, path, body.clone(), playing_request) {
            Err(RemoteApiError::NotAuthenticated) => {
                log::info!("token rejected by {method} {path}, refreshing and retrying");
                let token = self.refreshed_token()?;
                self.send_verb_with(&token, method, path, body, playing_request)
            }
            other => other,
        }
    }

    fn send_verb_with(
        &self,
        token: &str,
        method: &str,
        path: &str,
        body: Option<Value>,
        playing_request: bool,
    ) -> Result<(), RemoteApiError> {
        let request = self
            .http_client
            .request(method, &self.url(path))
            .set("Authorization", &format!("Bearer {token}"));
        let result = match body {
            Some(json) => request.send_json(json),
            None => request.send_string(""),
        };
        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) => Err(Self::map_status(status, playing_request)),
            Err(err) => Err(RemoteApiError::Transport(err.to_string())),
        }
    }

    fn fetch_state(&self, token: &str) -> Result<Option<EngineState>, RemoteApiError> {
        let response = match self
            .http_client
            .get(&self.url("/me/player"))
            .set("Authorization", &format!("Bearer {token}"))
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(Self::map_status(status, false)),
            Err(err) => return Err(RemoteApiError::Transport(err.to_string())),
        };
        // 204 means nothing is playing anywhere on the account.
        if response.status() == 204 {
            return Ok(None);
        }
        let parsed: Value = response
            .into_json()
            .map_err(|err| RemoteApiError::Transport(format!("state parse failed: {err}")))?;
        Ok(Some(Self::parse_state(&parsed)))
    }

    fn parse_state(parsed: &Value) -> EngineState {
        let item = parsed.get("item");
        EngineState {
            paused: !parsed
                .get("is_playing")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            position_ms: parsed
                .get("progress_ms")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            duration_ms: item
                .and_then(|item| item.get("duration_ms"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            track_uri: item
                .and_then(|item| item.get("uri"))
                .and_then(Value::as_str)
                .map(str::to_string),
            track_title: item
                .and_then(|item| item.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            track_artist: item
                .and_then(|item| item.get("artists"))
                .and_then(Value::as_array)
                .and_then(|artists| artists.first())
                .and_then(|artist| artist.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

impl RemoteController for WebApiClient {
    fn transfer_playback(&self, device_id: &str, play: bool) -> Result<(), RemoteApiError> {
        self.send_verb(
            "PUT",
            "/me/player",
            Some(serde_json::json!({ "device_ids": [device_id], "play": play })),
            false,
        )
    }

    fn play_uri(&self, device_id: &str, uri: &str, position_ms: u64) -> Result<(), RemoteApiError> {
        let path = format!("/me/player/play?device_id={}", urlencoding::encode(device_id));
        self.send_verb(
            "PUT",
            &path,
            Some(serde_json::json!({ "uris": [uri], "position_ms": position_ms })),
            true,
        )
    }

    fn pause(&self) -> Result<(), RemoteApiError> {
        self.send_verb("PUT", "/me/player/pause", None, false)
    }

    fn resume(&self, device_id: &str) -> Result<(), RemoteApiError> {
        let path = format!("/me/player/play?device_id={}", urlencoding::encode(device_id));
        // Empty body resumes the session's current context.
        self.send_verb("PUT", &path, None, true)
    }

    fn seek(&self, position_ms: u64) -> Result<(), RemoteApiError> {
        let path = format!("/me/player/seek?position_ms={position_ms}");
        self.send_verb("PUT", &path, None, false)
    }

    fn next_track(&self) -> Result<(), RemoteApiError> {
        self.send_verb("POST", "/me/player/next", None, false)
    }

    fn previous_track(&self) -> Result<(), RemoteApiError> {
        self.send_verb("POST", "/me/player/previous", None, false)
    }

    fn playback_state(&self) -> Result<Option<EngineState>, RemoteApiError> {
        let token = self.token()?;
        match self.fetch_state(&token) {
            Err(RemoteApiError::NotAuthenticated) => {
                log::info!("token rejected by state poll, refreshing and retrying");
                let token = self.refreshed_token()?;
                self.fetch_state(&token)
            }
            other => other,
        }
    }

    fn set_volume(&self, volume: f32) -> Result<(), RemoteApiError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        let path = format!("/me/player/volume?volume_percent={percent}");
        self.send_verb("PUT", &path, None, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_splits_play_403_from_generic_403() {
        assert_eq!(
            WebApiClient::map_status(403, true),
            RemoteApiError::TrackUnavailable
        );
        assert_eq!(WebApiClient::map_status(403, false), RemoteApiError::Http(403));
        assert_eq!(
            WebApiClient::map_status(401, false),
            RemoteApiError::NotAuthenticated
        );
        assert_eq!(
            WebApiClient::map_status(404, false),
            RemoteApiError::NoActiveSession
        );
    }

    #[test]
    fn test_parse_state_reads_position_and_track_fields() {
        let body = serde_json::json!({
            "is_playing": true,
            "progress_ms": 42_500,
            "item": {
                "uri": "remote:track:abc",
                "name": "Night Drive",
                "duration_ms": 201_000,
                "artists": [{ "name": "The Wires" }]
            }
        });
        let state = WebApiClient::parse_state(&body);
        assert!(!state.paused);
        assert_eq!(state.position_ms, 42_500);
        assert_eq!(state.duration_ms, 201_000);
        assert_eq!(state.track_uri.as_deref(), Some("remote:track:abc"));
        assert_eq!(state.track_artist.as_deref(), Some("The Wires"));
    }

    #[test]
    fn test_parse_state_defaults_missing_fields() {
        let state = WebApiClient::parse_state(&serde_json::json!({}));
        assert!(state.paused);
        assert_eq!(state.position_ms, 0);
        assert!(state.track_uri.is_none());
    }
}
