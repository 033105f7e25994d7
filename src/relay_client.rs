//! HTTP client for the local relay/auth-proxy service.
//!
//! The relay fronts the streaming service's OAuth flow and library reads.
//! Small endpoints return plain JSON; playlist and liked-track reads are
//! chunked `{"total":N,"items":[...]}` streams parsed incrementally so the
//! GUI can be fed in batches before the body finishes.

use std::io::Read;
use std::time::Duration;

use serde_json::Value;

use crate::config::RelayConfig;
use crate::protocol::PlaylistInfo;

const STREAM_CHUNK_BYTES: usize = 8 * 1024;

/// Token fetch outcome distinguishing "user never authorized" from
/// transport trouble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The relay has no credentials; the OAuth flow must run first.
    NotAuthenticated,
    Transport(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::NotAuthenticated => write!(formatter, "relay holds no access token"),
            TokenError::Transport(message) => write!(formatter, "relay token fetch failed: {message}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Supplies a fresh access token for every remote call.
///
/// Tokens are never cached by consumers; the relay owns refresh timing.
pub trait TokenSource: Send + Sync {
    fn fresh_token(&self) -> Result<String, TokenError>;

    /// Forces a refresh after the service rejected the current token.
    fn refreshed_token(&self) -> Result<String, TokenError>;
}

/// Totals reported after a streaming read completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// `total` announced in the stream header, when present.
    pub announced_total: Option<usize>,
    pub parsed: usize,
    pub skipped: usize,
}

/// Client for the relay contract.
pub struct RelayClient {
    http_client: ureq::Agent,
    base_url: String,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .timeout_write(Duration::from_millis(config.read_timeout_ms))
            .build();
        Self {
            http_client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn parse_token_body(parsed: &Value) -> Result<String, TokenError> {
        if let Some(token) = parsed.get("token").and_then(Value::as_str) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        if parsed.get("error").is_some() {
            return Err(TokenError::NotAuthenticated);
        }
        Err(TokenError::Transport(
            "relay token response carried neither token nor error".to_string(),
        ))
    }

    /// Fetches the current access token. Never cached by the caller.
    pub fn fetch_token(&self) -> Result<String, TokenError> {
        let response = match self.http_client.get(&self.url("/token")).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(401, _)) => return Err(TokenError::NotAuthenticated),
            Err(err) => return Err(TokenError::Transport(err.to_string())),
        };
        let parsed: Value = response
            .into_json()
            .map_err(|err| TokenError::Transport(format!("token response parse failed: {err}")))?;
        Self::parse_token_body(&parsed)
    }

    /// Forces a refresh and returns the new token.
    pub fn refresh_token(&self) -> Result<String, TokenError> {
        let response = match self
            .http_client
            .post(&self.url("/refresh_token"))
            .send_string("")
        {
            Ok(response) => response,
            Err(ureq::Error::Status(401, _)) => return Err(TokenError::NotAuthenticated),
            Err(err) => return Err(TokenError::Transport(err.to_string())),
        };
        let parsed: Value = response
            .into_json()
            .map_err(|err| TokenError::Transport(format!("refresh response parse failed: {err}")))?;
        Self::parse_token_body(&parsed)
    }

    /// Lists the account's playlists for the GUI playlist selector.
    pub fn fetch_playlists(&self) -> Result<Vec<PlaylistInfo>, String> {
        let response = self
            .http_client
            .get(&self.url("/playlists"))
            .call()
            .map_err(|err| format!("playlist catalog request failed: {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("playlist catalog parse failed: {err}"))?;
        let items = match parsed.get("items") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        };
        let playlists = items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?.to_string();
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("Untitled Playlist")
                    .to_string();
                Some(PlaylistInfo { id, name })
            })
            .collect();
        Ok(playlists)
    }

    /// Streams one of the chunked item endpoints (`/playlist/:id`,
    /// `/liked`), invoking `on_item` for every complete object as soon as
    /// it can be cut out of the byte stream. The second argument is the
    /// item count announced in the stream header, once it has been seen.
    pub fn stream_items(
        &self,
        path: &str,
        on_item: &mut dyn FnMut(Value, Option<usize>),
    ) -> Result<StreamSummary, String> {
        let response = self
            .http_client
            .get(&self.url(path))
            .call()
            .map_err(|err| format!("streaming request failed ({path}): {err}"))?;
        let mut reader = response.into_reader();
        let mut parser = StreamingItemParser::new();
        let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
        loop {
            let read = reader
                .read(&mut chunk)
                .map_err(|err| format!("streaming read failed ({path}): {err}"))?;
            if read == 0 {
                break;
            }
            let items = parser.feed(&chunk[..read]);
            let announced_total = parser.announced_total();
            for item in items {
                on_item(item, announced_total);
            }
        }
        Ok(parser.finish())
    }
}

impl TokenSource for RelayClient {
    fn fresh_token(&self) -> Result<String, TokenError> {
        self.fetch_token()
    }

    fn refreshed_token(&self) -> Result<String, TokenError> {
        self.refresh_token()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseStage {
    /// Still looking for the `"items": [` opener.
    Header,
    /// Inside the items array, cutting out top-level objects.
    Items,
    /// Array closed; trailing bytes are ignored.
    Done,
}

/// Incremental parser for `{"total":N,"items":[{...},{...}]}` bodies.
///
/// Bytes are appended as they arrive; complete top-level objects are cut
/// out by brace counting that respects string literals and escapes, so an
/// object split across any chunk boundary still parses. A malformed
/// segment is dropped and counted rather than aborting the stream.
pub struct StreamingItemParser {
    buffer: Vec<u8>,
    stage: ParseStage,
    announced_total: Option<usize>,
    parsed: usize,
    skipped: usize,
    scan_pos: usize,
    object_start: Option<usize>,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl StreamingItemParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            stage: ParseStage::Header,
            announced_total: None,
            parsed: 0,
            skipped: 0,
            scan_pos: 0,
            object_start: None,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    /// Appends a chunk and returns every item completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);
        if self.stage == ParseStage::Header {
            self.try_finish_header();
        }
        if self.stage != ParseStage::Items {
            return Vec::new();
        }
        self.scan_items()
    }

    /// Item count announced in the stream header; available as soon as
    /// the header has been parsed, ahead of `finish()`.
    pub fn announced_total(&self) -> Option<usize> {
        self.announced_total
    }

    /// Final counters once the body is exhausted.
    pub fn finish(self) -> StreamSummary {
        StreamSummary {
            announced_total: self.announced_total,
            parsed: self.parsed,
            skipped: self.skipped,
        }
    }

    fn try_finish_header(&mut self) {
        let Some(items_key) = find_subslice(&self.buffer, b"\"items\"") else {
            return;
        };
        let Some(bracket_offset) = self.buffer[items_key..].iter().position(|byte| *byte == b'[')
        else {
            return;
        };
        self.announced_total = parse_total(&self.buffer[..items_key]);
        let items_start = items_key + bracket_offset + 1;
        self.buffer.drain(..items_start);
        self.scan_pos = 0;
        self.stage = ParseStage::Items;
    }

    fn scan_items(&mut self) -> Vec<Value> {
        let mut items = Vec::new();
        while self.scan_pos < self.buffer.len() {
            let byte = self.buffer[self.scan_pos];
            if self.object_start.is_none() {
                match byte {
                    b'{' => {
                        self.object_start = Some(self.scan_pos);
                        self.depth = 1;
                        self.in_string = false;
                        self.escaped = false;
                    }
                    b']' => {
                        self.stage = ParseStage::Done;
                        self.buffer.clear();
                        self.scan_pos = 0;
                        return items;
                    }
                    // Separators and whitespace between items.
                    _ => {}
                }
                self.scan_pos += 1;
                continue;
            }
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
            } else {
                match byte {
                    b'"' => self.in_string = true,
                    b'{' => self.depth += 1,
                    b'}' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            let start = self.object_start.take().unwrap_or(0);
                            let end = self.scan_pos + 1;
                            match serde_json::from_slice::<Value>(&self.buffer[start..end]) {
                                Ok(item) => {
                                    self.parsed += 1;
                                    items.push(item);
                                }
                                Err(err) => {
                                    self.skipped += 1;
                                    log::warn!("skipping malformed stream item: {err}");
                                }
                            }
                            self.buffer.drain(..end);
                            self.scan_pos = 0;
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            self.scan_pos += 1;
        }
        items
    }
}

impl Default for StreamingItemParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_total(header: &[u8]) -> Option<usize> {
    let key = find_subslice(header, b"\"total\"")?;
    let tail = &header[key + b"\"total\"".len()..];
    let colon = tail.iter().position(|byte| *byte == b':')?;
    let digits: Vec<u8> = tail[colon + 1..]
        .iter()
        .copied()
        .skip_while(|byte| byte.is_ascii_whitespace())
        .take_while(|byte| byte.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    std::str::from_utf8(&digits).ok()?.parse().ok()
}
