//! JSON shapes exchanged with the recognition/display server.
//!
//! Every response struct is tolerant: missing fields fall back to defaults
//! and unknown fields are ignored, so a server that grows new keys never
//! breaks the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint paths, relative to the server base URL.
pub mod paths {
    pub const STATUS: &str = "/api/status";
    pub const RECOGNIZER_STATUS: &str = "/api/recognizer/status";
    pub const RECOGNIZER_START: &str = "/api/recognizer/start";
    pub const RECOGNIZER_STOP: &str = "/api/recognizer/stop";
    pub const LYRICS: &str = "/api/lyrics";
    pub const DEVICE_STATUS: &str = "/api/pixoo/status";
    /// Older servers.
    pub const DEVICE_STATE: &str = "/api/pixoo/state";
    pub const PIXOO_BRIGHTNESS: &str = "/api/pixoo/brightness";
    pub const PIXOO_CHANNEL: &str = "/api/pixoo/channel";
    pub const PIXOO_REBOOT: &str = "/api/pixoo/reboot";
    pub const PIXOO_DISCOVER: &str = "/api/pixoo/discover-and-save";
    pub const PIXOO_LIKED_GIFS: &str = "/api/pixoo/liked-gifs";
    pub const PIXOO_PLAY_REMOTE: &str = "/api/pixoo/play-remote";
    pub const STATS: &str = "/api/stats";
    pub const CONFIG: &str = "/api/config";
    pub const CONFIG_RESET: &str = "/api/config/reset";
    pub const FALLBACK_IMAGES: &str = "/api/fallback-images";
    pub const FALLBACK_IMAGE: &str = "/api/fallback-image";
}

/// Device brightness accepted by the display, in percent.
pub const BRIGHTNESS_MAX: u8 = 100;
/// Reported by the server when the device omits its brightness.
pub const DEFAULT_BRIGHTNESS: u8 = 50;
/// Reported by the server when the device omits its channel.
pub const DEFAULT_CHANNEL: u32 = 3;

// ── Now playing ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NowPlayingResponse {
    /// Servers send either `true` or a message string here.
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl NowPlayingResponse {
    /// True when the server flagged the snapshot as unusable.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(is_truthy)
    }
}

// ── Recognizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizerStatusResponse {
    #[serde(default)]
    pub running: bool,
}

// ── Lyrics ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricsResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Pixoo device ──────────────────────────────────────────────────────────────

/// `/api/pixoo/status` reports `online`; the older `/api/pixoo/state`
/// reports `reachable`.  Either one counts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceStatusResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub reachable: Option<bool>,
    #[serde(default)]
    pub brightness: Option<Value>,
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceStatusResponse {
    pub fn is_reachable(&self) -> bool {
        self.ok && self.online.or(self.reachable).unwrap_or(false)
    }

    /// Brightness if the server sent a number, clamped to the device range.
    pub fn brightness(&self) -> Option<u8> {
        self.brightness
            .as_ref()
            .and_then(Value::as_f64)
            .map(|b| b.round().clamp(0.0, BRIGHTNESS_MAX as f64) as u8)
    }

    pub fn channel(&self) -> Option<u32> {
        self.channel
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BrightnessRequest {
    pub brightness: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRequest {
    pub channel: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayRemoteRequest {
    pub file_id: String,
}

/// Generic `{ok, error?}` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Identity of a device found through the cloud-discovery relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_private_ip: Option<String>,
    #[serde(default)]
    pub device_id: Option<i64>,
    #[serde(default)]
    pub device_mac: Option<String>,
}

impl DiscoveredDevice {
    pub fn display_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("Pixoo")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub device: Option<DiscoveredDevice>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LikedGif {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl LikedGif {
    pub fn label(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.file_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LikedGifsResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub gifs: Vec<LikedGif>,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopSong {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub count: u64,
}

/// Shared by `top_artists` and `top_albums`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub top_songs: Vec<TopSong>,
    #[serde(default)]
    pub top_artists: Vec<TopEntry>,
    #[serde(default)]
    pub top_albums: Vec<TopEntry>,
}

impl StatsResponse {
    pub fn is_empty(&self) -> bool {
        self.top_songs.is_empty() && self.top_artists.is_empty() && self.top_albums.is_empty()
    }
}

// ── Fallback image gallery ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FallbackImage {
    pub filename: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FallbackImagesResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub images: Vec<FallbackImage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// JavaScript-style truthiness, which is what the server's `error` field
/// was designed around.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
