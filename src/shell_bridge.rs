//! Shell bridge pump.
//!
//! The desktop shell exposes a small local HTTP surface: GUI and engine
//! events accumulate behind `GET /bridge/events`, and shell commands are
//! delivered with `POST /bridge/commands`. This pump translates between
//! that surface and the bus.

use std::time::{Duration, Instant};

use log::warn;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::RemoteConfig;
use crate::protocol::{GuiMessage, Message, ShellCommand};

const LOOP_SLEEP: Duration = Duration::from_millis(10);
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ShellBridge {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    http_client: ureq::Agent,
    bridge_base_url: String,
    last_event_poll_at: Instant,
}

impl ShellBridge {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        config: &RemoteConfig,
    ) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .timeout_write(Duration::from_secs(10))
            .build();
        Self {
            bus_consumer,
            bus_producer,
            http_client,
            bridge_base_url: config.bridge_base_url.trim().trim_end_matches('/').to_string(),
            last_event_poll_at: Instant::now(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.bridge_base_url)
    }

    /// Starts the blocking pump loop.
    pub fn run(&mut self) {
        log::info!("shell bridge pump started");
        loop {
            if self.process_pending_bus_messages() {
                break;
            }
            if self.poll_bridge_events_if_due() {
                break;
            }
            std::thread::sleep(LOOP_SLEEP);
        }
        log::info!("shell bridge pump stopped");
    }

    /// Forwards queued shell commands to the bridge; true means stop.
    fn process_pending_bus_messages(&mut self) -> bool {
        loop {
            match self.bus_consumer.try_recv() {
                Ok(Message::Shell(command)) => self.post_command(&command),
                // Our own forwarded close event comes back around; that is
                // the stop signal for this loop as well.
                Ok(Message::Gui(GuiMessage::WindowClosed)) => return true,
                Ok(_) => {}
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("ShellBridge lagged on control bus, skipped {skipped} message(s)");
                }
                Err(TryRecvError::Closed) => return true,
            }
        }
    }

    fn post_command(&self, command: &ShellCommand) {
        let payload = match serde_json::to_value(command) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("shell command serialization failed: {err}");
                return;
            }
        };
        if let Err(err) = self
            .http_client
            .post(&self.url("/bridge/commands"))
            .send_json(payload)
        {
            warn!("shell command delivery failed: {err}");
        }
    }

    /// Drains bridge events onto the bus; true means the window closed.
    fn poll_bridge_events_if_due(&mut self) -> bool {
        if self.last_event_poll_at.elapsed() < EVENT_POLL_INTERVAL {
            return false;
        }
        self.last_event_poll_at = Instant::now();
        let response = match self.http_client.get(&self.url("/bridge/events")).call() {
            Ok(response) => response,
            Err(err) => {
                log::debug!("bridge event poll failed: {err}");
                return false;
            }
        };
        let events: Vec<GuiMessage> = match response.into_json() {
            Ok(events) => events,
            Err(err) => {
                warn!("bridge event parse failed: {err}");
                return false;
            }
        };
        let mut window_closed = false;
        for event in events {
            if matches!(event, GuiMessage::WindowClosed) {
                window_closed = true;
            }
            let _ = self.bus_producer.send(Message::Gui(event));
        }
        window_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GuiTrack, RemoteBackedTrack};

    #[test]
    fn test_shell_commands_serialize_with_type_tags() {
        let command = ShellCommand::ResumeLocalAudio { offset_ms: 42_000 };
        let payload = serde_json::to_value(&command).expect("command should serialize");
        assert_eq!(payload["type"], "resume_local_audio");
        assert_eq!(payload["offset_ms"], 42_000);

        let command = ShellCommand::SetNowPlayingTitle { title: None };
        let payload = serde_json::to_value(&command).expect("command should serialize");
        assert_eq!(payload["type"], "set_now_playing_title");
        assert!(payload["title"].is_null());
    }

    #[test]
    fn test_gui_events_deserialize_from_bridge_payload() {
        let body = r#"[
            {"type": "play_pressed"},
            {"type": "seek_bar_input", "fraction": 0.25},
            {"type": "track_changed", "index": 2, "playlist_len": 9,
             "track": {"kind": "remote_backed", "title": "Song", "artist": "Artist",
                       "duration_ms": 180000, "uri": "remote:track:1"}},
            {"type": "window_closed"}
        ]"#;
        let events: Vec<GuiMessage> = serde_json::from_str(body).expect("events should parse");
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], GuiMessage::PlayPressed));
        assert!(matches!(
            events[1],
            GuiMessage::SeekBarInput { fraction } if (fraction - 0.25).abs() < f32::EPSILON
        ));
        match &events[2] {
            GuiMessage::TrackChanged {
                track: GuiTrack::RemoteBacked(RemoteBackedTrack { uri, .. }),
                index,
                playlist_len,
            } => {
                assert_eq!(uri, "remote:track:1");
                assert_eq!(*index, 2);
                assert_eq!(*playlist_len, 9);
            }
            other => panic!("expected track change, got {other:?}"),
        }
        assert!(matches!(events[3], GuiMessage::WindowClosed));
    }
}
