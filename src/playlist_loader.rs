//! Playlist streaming loader.
//!
//! Fetches playlists and the liked-tracks library over the relay's chunked
//! transport, parses items as they arrive, appends tracks to the GUI
//! playlist in batches, and registers resolver entries along the way. The
//! GUI shows the first rows long before large libraries finish loading.

use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::protocol::{
    GuiMessage, GuiTrack, IndexedTrack, Message, PlaylistMessage, RemoteBackedTrack, ShellCommand,
};
use crate::relay_client::RelayClient;

/// Rows are appended to the GUI in batches of this size.
const APPEND_BATCH_SIZE: usize = 50;

pub struct PlaylistLoader {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    relay: Arc<RelayClient>,
}

impl PlaylistLoader {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        relay: Arc<RelayClient>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            relay,
        }
    }

    /// Starts the blocking event loop.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Gui(GuiMessage::RequestPlaylists)) => {
                    self.publish_playlist_catalog();
                }
                Ok(Message::Gui(GuiMessage::LoadPlaylist { playlist_id })) => {
                    let path = format!("/playlist/{}", urlencoding::encode(&playlist_id));
                    self.load_source(&path, &format!("playlist {playlist_id}"));
                }
                Ok(Message::Gui(GuiMessage::LoadLikedTracks)) => {
                    self.load_source("/liked", "liked tracks");
                }
                Ok(Message::Gui(GuiMessage::WindowClosed)) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "PlaylistLoader lagged on control bus, skipped {} message(s)",
                        skipped
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn publish_playlist_catalog(&self) {
        match self.relay.fetch_playlists() {
            Ok(playlists) => {
                info!("fetched {} playlists", playlists.len());
                let _ = self
                    .bus_producer
                    .send(Message::Shell(ShellCommand::PlaylistsAvailable {
                        playlists,
                    }));
            }
            Err(error) => {
                warn!("playlist catalog fetch failed: {error}");
            }
        }
    }

    fn load_source(&self, path: &str, source: &str) {
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::LoadStarted {
                source: source.to_string(),
            }));

        let mut batch: Vec<IndexedTrack> = Vec::new();
        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut total_hint = 0usize;
        let mut first_batch = true;

        let result = {
            let bus_producer = &self.bus_producer;
            let mut on_item = |item: Value, announced_total: Option<usize>| {
                if let Some(total) = announced_total {
                    total_hint = total;
                }
                match parse_track_item(&item) {
                    Some(track) => {
                        loaded += 1;
                        batch.push(track);
                    }
                    None => {
                        skipped += 1;
                    }
                }
                if batch.len() >= APPEND_BATCH_SIZE {
                    Self::flush_batch(bus_producer, &mut batch, &mut first_batch);
                    let _ = bus_producer.send(Message::Playlist(PlaylistMessage::LoadProgress {
                        loaded,
                        total: total_hint,
                    }));
                }
            };
            self.relay.stream_items(path, &mut on_item)
        };

        match result {
            Ok(summary) => {
                total_hint = summary.announced_total.unwrap_or(loaded);
                skipped += summary.skipped;
                Self::flush_batch(&self.bus_producer, &mut batch, &mut first_batch);
                info!("{source}: loaded {loaded} tracks, skipped {skipped}");
                let _ = self.bus_producer.send(Message::Playlist(
                    PlaylistMessage::LoadProgress {
                        loaded,
                        total: total_hint,
                    },
                ));
                let _ = self
                    .bus_producer
                    .send(Message::Playlist(PlaylistMessage::LoadFinished {
                        loaded,
                        skipped,
                    }));
            }
            Err(error) => {
                warn!("{source}: load failed: {error}");
                // Keep whatever already reached the GUI.
                Self::flush_batch(&self.bus_producer, &mut batch, &mut first_batch);
                let _ = self
                    .bus_producer
                    .send(Message::Playlist(PlaylistMessage::LoadFailed {
                        source: source.to_string(),
                        error,
                    }));
            }
        }
    }

    /// Publishes one batch: resolver entries for the controller, rows for
    /// the GUI. The first batch replaces the playlist, later ones append.
    fn flush_batch(
        bus_producer: &Sender<Message>,
        batch: &mut Vec<IndexedTrack>,
        first_batch: &mut bool,
    ) {
        if batch.is_empty() {
            return;
        }
        let entries: Vec<IndexedTrack> = std::mem::take(batch);
        let gui_tracks: Vec<GuiTrack> = entries
            .iter()
            .map(|entry| {
                GuiTrack::RemoteBacked(RemoteBackedTrack {
                    title: entry.title.clone(),
                    artist: entry.artist.clone(),
                    duration_ms: entry.duration_ms,
                    uri: entry.uri.clone(),
                })
            })
            .collect();
        let _ = bus_producer.send(Message::Playlist(PlaylistMessage::TracksIndexed {
            entries: Arc::new(entries),
        }));
        let command = if *first_batch {
            ShellCommand::ReplacePlaylist { tracks: gui_tracks }
        } else {
            ShellCommand::AppendPlaylistTracks { tracks: gui_tracks }
        };
        *first_batch = false;
        let _ = bus_producer.send(Message::Shell(command));
    }
}

/// Parses one relay stream item of the shape
/// `{"track": {"name", "artists": [{"name"}], "uri", "duration_ms"}}`.
/// Items missing a URI or name are unplayable and rejected.
fn parse_track_item(item: &Value) -> Option<IndexedTrack> {
    let track = item.get("track").unwrap_or(item);
    let uri = track.get("uri")?.as_str()?;
    if uri.is_empty() {
        return None;
    }
    let title = track.get("name")?.as_str()?.to_string();
    let artist = track
        .get("artists")
        .and_then(Value::as_array)
        .and_then(|artists| artists.first())
        .and_then(|artist| artist.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown Artist")
        .to_string();
    let duration_ms = track
        .get("duration_ms")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(IndexedTrack {
        title,
        artist,
        uri: uri.to_string(),
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[test]
    fn test_parse_track_item_reads_nested_track() {
        let item = serde_json::json!({
            "track": {
                "name": "Night Drive",
                "artists": [{ "name": "The Wires" }, { "name": "Feature" }],
                "uri": "remote:track:1",
                "duration_ms": 201_000
            }
        });
        let track = parse_track_item(&item).expect("item should parse");
        assert_eq!(track.title, "Night Drive");
        assert_eq!(track.artist, "The Wires");
        assert_eq!(track.uri, "remote:track:1");
        assert_eq!(track.duration_ms, 201_000);
    }

    #[test]
    fn test_parse_track_item_accepts_flat_shape() {
        let item = serde_json::json!({
            "name": "Flat",
            "uri": "remote:track:flat",
            "duration_ms": 1_000
        });
        let track = parse_track_item(&item).expect("flat item should parse");
        assert_eq!(track.artist, "Unknown Artist");
    }

    #[test]
    fn test_parse_track_item_rejects_unplayable_entries() {
        assert!(parse_track_item(&serde_json::json!({ "track": { "name": "No URI" } })).is_none());
        assert!(
            parse_track_item(&serde_json::json!({ "track": { "uri": "", "name": "Empty" } }))
                .is_none()
        );
        assert!(parse_track_item(&serde_json::json!({ "track": null })).is_none());
    }

    #[test]
    fn test_flush_batch_replaces_first_then_appends() {
        let (bus_producer, mut observer) = broadcast::channel(16);
        let mut first_batch = true;

        let mut batch = vec![IndexedTrack {
            title: "One".to_string(),
            artist: "A".to_string(),
            uri: "remote:track:1".to_string(),
            duration_ms: 1_000,
        }];
        PlaylistLoader::flush_batch(&bus_producer, &mut batch, &mut first_batch);
        assert!(batch.is_empty());

        let mut batch = vec![IndexedTrack {
            title: "Two".to_string(),
            artist: "B".to_string(),
            uri: "remote:track:2".to_string(),
            duration_ms: 2_000,
        }];
        PlaylistLoader::flush_batch(&bus_producer, &mut batch, &mut first_batch);

        let mut shell_commands = Vec::new();
        let mut indexed_batches = 0;
        while let Ok(message) = observer.try_recv() {
            match message {
                Message::Shell(command) => shell_commands.push(command),
                Message::Playlist(PlaylistMessage::TracksIndexed { .. }) => indexed_batches += 1,
                _ => {}
            }
        }
        assert_eq!(indexed_batches, 2);
        assert!(matches!(
            shell_commands[0],
            ShellCommand::ReplacePlaylist { .. }
        ));
        assert!(matches!(
            shell_commands[1],
            ShellCommand::AppendPlaylistTracks { .. }
        ));
    }

    #[test]
    fn test_empty_flush_emits_nothing() {
        let (bus_producer, mut observer) = broadcast::channel(4);
        let mut first_batch = true;
        let mut batch = Vec::new();
        PlaylistLoader::flush_batch(&bus_producer, &mut batch, &mut first_batch);
        assert!(observer.try_recv().is_err());
        assert!(first_batch);
    }
}
