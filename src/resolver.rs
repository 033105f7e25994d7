//! Track identity resolution from GUI metadata to remote URIs.

use std::collections::HashMap;

/// Append-only map from a (title, artist) pair to a remote track URI,
/// populated while playlists stream in.
///
/// Keys keep the original casing; only surrounding whitespace is trimmed.
/// Two distinct tracks sharing title and artist collide, and the last
/// registration wins. That is a known limitation of keying on display
/// metadata; the GUI surface exposes nothing more stable.
#[derive(Debug, Default)]
pub struct TrackResolver {
    uris_by_identity: HashMap<String, String>,
}

// Title and artist are joined on a separator that cannot occur in either.
const KEY_SEPARATOR: char = '\u{1f}';

impl TrackResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(title: &str, artist: &str) -> String {
        format!("{}{KEY_SEPARATOR}{}", title.trim(), artist.trim())
    }

    /// Registers an identity. Re-registering the same pair replaces the
    /// stored URI.
    pub fn register(&mut self, title: &str, artist: &str, uri: &str) {
        self.uris_by_identity
            .insert(Self::key(title, artist), uri.to_string());
    }

    /// Looks up the URI for a GUI track's metadata.
    pub fn resolve(&self, title: &str, artist: &str) -> Option<&str> {
        self.uris_by_identity
            .get(&Self::key(title, artist))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris_by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris_by_identity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut resolver = TrackResolver::new();
        resolver.register("Night Drive", "The Wires", "remote:track:1");
        assert_eq!(
            resolver.resolve("Night Drive", "The Wires"),
            Some("remote:track:1")
        );
        assert_eq!(resolver.resolve("Night Drive", "Someone Else"), None);
    }

    #[test]
    fn test_keys_trim_whitespace_but_preserve_case() {
        let mut resolver = TrackResolver::new();
        resolver.register("  Night Drive ", "The Wires  ", "remote:track:1");
        assert_eq!(
            resolver.resolve("Night Drive", "The Wires"),
            Some("remote:track:1")
        );
        assert_eq!(resolver.resolve("night drive", "the wires"), None);
    }

    #[test]
    fn test_reregistration_replaces_uri() {
        let mut resolver = TrackResolver::new();
        resolver.register("Song", "Band", "remote:track:old");
        resolver.register("Song", "Band", "remote:track:new");
        assert_eq!(resolver.resolve("Song", "Band"), Some("remote:track:new"));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_title_containing_artist_text_does_not_collide() {
        let mut resolver = TrackResolver::new();
        resolver.register("A", "BC", "remote:track:1");
        resolver.register("AB", "C", "remote:track:2");
        assert_eq!(resolver.resolve("A", "BC"), Some("remote:track:1"));
        assert_eq!(resolver.resolve("AB", "C"), Some("remote:track:2"));
    }
}
