//! RemoteSource: one polled endpoint and how its answer lands in the view.
//!
//! A source only knows how to build its request, how to parse a response
//! into its own field group, and what its degraded render looks like.
//! `SourceRunner` wraps it with the transport, the state store and a
//! per-source sequence number so a slow, older response can never
//! overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use tracing::{debug, warn};
use vinyl_proto::protocol::{
    paths, DeviceStatusResponse, LikedGifsResponse, NowPlayingResponse, RecognizerStatusResponse,
    StatsResponse, TopEntry, DEFAULT_BRIGHTNESS, DEFAULT_CHANNEL,
};

use crate::collection::RankedListItem;
use crate::error::SyncError;
use crate::state::{DashboardState, DeviceState, RecognizerState, Track, TrackSnapshot};
use crate::transport::{ApiRequest, ApiResponse, SharedTransport};

pub const NO_DATA: &str = "No data";
pub const UNKNOWN_TITLE: &str = "Unknown title";
pub const UNKNOWN_ARTIST: &str = "Unknown artist";
pub const STATUS_LOAD_ERROR: &str = "Error loading data";
pub const RECOGNIZER_RUNNING: &str = "Running";
pub const RECOGNIZER_STOPPED: &str = "Stopped";
pub const RECOGNIZER_ERROR: &str = "Status error";
pub const DEVICE_UNREACHABLE: &str = "Pixoo not reachable.";
pub const DEVICE_LOAD_ERROR: &str = "Error loading Pixoo status.";
pub const STATS_EMPTY: &str = "No data yet, play a record!";

pub trait RemoteSource: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn request(&self) -> ApiRequest;

    /// Parse `response` and write the result into this source's field group.
    /// Must not touch state when it returns `Err`.
    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError>;

    /// Render the "could not refresh" look for this source.
    fn degrade(&self, state: &mut DashboardState, error: &SyncError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer request of the same source completed first; this result was dropped.
    Stale,
}

pub struct SourceRunner {
    source: Box<dyn RemoteSource>,
    transport: SharedTransport,
    store: crate::state::StateStore,
    issued: AtomicU64,
    applied: AtomicU64,
}

impl SourceRunner {
    pub fn new(
        source: impl RemoteSource,
        transport: SharedTransport,
        store: crate::state::StateStore,
    ) -> Self {
        Self {
            source: Box::new(source),
            transport,
            store,
            issued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    /// Fetch once and apply the result (or the degraded render).  Errors are
    /// already rendered by the time they are returned.
    pub async fn fetch_and_apply(&self) -> Result<FetchOutcome, SyncError> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let response = self.transport.send(self.source.request()).await;

        let source = &self.source;
        let applied = &self.applied;
        self.store
            .update(|state| {
                let last = applied.load(Ordering::SeqCst);
                if seq < last {
                    debug!("{}: dropping response #{} (already applied #{})", source.name(), seq, last);
                    return Ok(FetchOutcome::Stale);
                }
                applied.store(seq, Ordering::SeqCst);

                match response.and_then(|r| source.apply(state, r)) {
                    Ok(()) => Ok(FetchOutcome::Applied),
                    Err(e) => {
                        warn!("{}: refresh failed: {}", source.name(), e);
                        source.degrade(state, &e);
                        Err(e)
                    }
                }
            })
            .await
    }
}

// ── Now playing ───────────────────────────────────────────────────────────────

pub struct NowPlayingSource {
    placeholder_cover: String,
}

impl NowPlayingSource {
    pub fn new(placeholder_cover: impl Into<String>) -> Self {
        Self {
            placeholder_cover: placeholder_cover.into(),
        }
    }

    fn render_empty(&self, state: &mut DashboardState, title: &str) {
        state.track = TrackSnapshot::NoData;
        state.now_playing.title = title.to_string();
        state.now_playing.artist.clear();
        state.now_playing.album.clear();
        state.now_playing.cover_url = self.placeholder_cover.clone();
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RemoteSource for NowPlayingSource {
    fn name(&self) -> &'static str {
        "now-playing"
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(paths::STATUS)
    }

    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError> {
        let status: NowPlayingResponse = response.parse()?;
        if status.is_error() {
            self.render_empty(state, NO_DATA);
            return Ok(());
        }

        let track = Track {
            title: non_empty(status.title).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: non_empty(status.artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: status.album.unwrap_or_default(),
            cover_url: non_empty(status.cover_url).unwrap_or_else(|| self.placeholder_cover.clone()),
        };
        state.now_playing.title = track.title.clone();
        state.now_playing.artist = track.artist.clone();
        state.now_playing.album = track.album.clone();
        state.now_playing.cover_url = track.cover_url.clone();
        state.track = TrackSnapshot::Playing(track);
        Ok(())
    }

    fn degrade(&self, state: &mut DashboardState, _error: &SyncError) {
        self.render_empty(state, STATUS_LOAD_ERROR);
    }
}

// ── Recognizer ────────────────────────────────────────────────────────────────

pub struct RecognizerSource;

impl RemoteSource for RecognizerSource {
    fn name(&self) -> &'static str {
        "recognizer"
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(paths::RECOGNIZER_STATUS)
    }

    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError> {
        let status: RecognizerStatusResponse = response.parse()?;
        let view = &mut state.recognizer;
        view.toggle_on = status.running;
        if status.running {
            view.state = RecognizerState::Running;
            view.status_text = RECOGNIZER_RUNNING.to_string();
        } else {
            view.state = RecognizerState::Stopped;
            view.status_text = RECOGNIZER_STOPPED.to_string();
        }
        Ok(())
    }

    fn degrade(&self, state: &mut DashboardState, _error: &SyncError) {
        state.recognizer.state = RecognizerState::Unknown;
        state.recognizer.status_text = RECOGNIZER_ERROR.to_string();
    }
}

// ── Device status ─────────────────────────────────────────────────────────────

pub struct DeviceStatusSource {
    path: String,
}

impl DeviceStatusSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl RemoteSource for DeviceStatusSource {
    fn name(&self) -> &'static str {
        "device-status"
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(self.path.clone())
    }

    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError> {
        let status: DeviceStatusResponse = response.parse_object()?;
        if !status.is_reachable() {
            return Err(SyncError::DeviceUnreachable(status.error.unwrap_or_default()));
        }

        let brightness = status.brightness().unwrap_or(DEFAULT_BRIGHTNESS);
        let channel = status.channel().unwrap_or(DEFAULT_CHANNEL);
        let view = &mut state.device;
        view.brightness.confirm(brightness);
        view.channel.confirm(channel);
        view.status_text = format!("Connected to {}", status.device_name.as_deref().unwrap_or("Pixoo"));
        view.status_sub = format!("Brightness: {}% – Channel: {}", brightness, channel);
        view.device = Some(DeviceState {
            reachable: true,
            brightness,
            channel,
            device_name: status.device_name,
        });
        view.refreshed_at = Some(Local::now());
        Ok(())
    }

    fn degrade(&self, state: &mut DashboardState, error: &SyncError) {
        let view = &mut state.device;
        view.brightness.revert();
        view.channel.revert();
        if let Some(device) = view.device.as_mut() {
            device.reachable = false;
        }
        match error {
            SyncError::DeviceUnreachable(msg) => {
                view.status_text = DEVICE_UNREACHABLE.to_string();
                view.status_sub = msg.clone();
            }
            other => {
                view.status_text = DEVICE_LOAD_ERROR.to_string();
                view.status_sub = other.to_string();
            }
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

pub struct StatsSource;

impl RemoteSource for StatsSource {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(paths::STATS)
    }

    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError> {
        let stats: StatsResponse = response.parse()?;
        if stats.is_empty() {
            render_no_stats(state);
            return Ok(());
        }

        let songs: Vec<RankedListItem> = stats
            .top_songs
            .into_iter()
            .enumerate()
            .map(|(i, s)| RankedListItem {
                rank: i + 1,
                label: s.title,
                sublabel: non_empty(s.artist),
                count: s.count,
            })
            .collect();

        let view = &mut state.stats;
        view.songs.replace(songs);
        view.artists.replace(ranked(stats.top_artists));
        view.albums.replace(ranked(stats.top_albums));
        view.empty_message = None;
        Ok(())
    }

    fn degrade(&self, state: &mut DashboardState, _error: &SyncError) {
        render_no_stats(state);
    }
}

fn ranked(entries: Vec<TopEntry>) -> Vec<RankedListItem> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| RankedListItem {
            rank: i + 1,
            label: e.name,
            sublabel: None,
            count: e.count,
        })
        .collect()
}

fn render_no_stats(state: &mut DashboardState) {
    let view = &mut state.stats;
    view.songs.replace(Vec::new());
    view.artists.replace(Vec::new());
    view.albums.replace(Vec::new());
    view.empty_message = Some(STATS_EMPTY.to_string());
}

// ── Liked GIFs ────────────────────────────────────────────────────────────────

/// Fetched on demand rather than polled.
pub struct LikedGifsSource;

impl RemoteSource for LikedGifsSource {
    fn name(&self) -> &'static str {
        "liked-gifs"
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(paths::PIXOO_LIKED_GIFS)
    }

    fn apply(&self, state: &mut DashboardState, response: ApiResponse) -> Result<(), SyncError> {
        let likes: LikedGifsResponse = response.parse_object()?;
        if !likes.ok {
            return Err(SyncError::DeviceUnreachable(
                likes.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        state.likes.status_text = if likes.gifs.is_empty() {
            "No liked GIFs found.".to_string()
        } else {
            format!("Loaded {} GIF(s).", likes.gifs.len())
        };
        state.likes.gifs = likes.gifs;
        Ok(())
    }

    fn degrade(&self, state: &mut DashboardState, _error: &SyncError) {
        state.likes.gifs.clear();
        state.likes.status_text = "Error loading liked GIFs.".to_string();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::intent::Provisional;
    use crate::state::StateStore;
    use crate::testing::FakeTransport;
    use crate::transport::Method;

    fn store() -> StateStore {
        StateStore::new(DashboardState::new(5, "/logo.png"))
    }

    fn runner(source: impl RemoteSource, fake: &Arc<FakeTransport>, store: &StateStore) -> SourceRunner {
        SourceRunner::new(source, fake.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_now_playing_defaults_for_missing_fields() {
        let fake = FakeTransport::new();
        let store = store();
        fake.respond(Method::Get, paths::STATUS, json!({"title": "Hejira", "artist": "Joni Mitchell"}));

        let r = runner(NowPlayingSource::new("/logo.png"), &fake, &store);
        assert_eq!(r.fetch_and_apply().await, Ok(FetchOutcome::Applied));

        let s = store.snapshot().await;
        assert_eq!(s.now_playing.album, "");
        assert_eq!(s.now_playing.cover_url, "/logo.png");
        assert_eq!(
            s.track.lookup_key(),
            Some(("Joni Mitchell".to_string(), "Hejira".to_string()))
        );
    }

    #[tokio::test]
    async fn test_now_playing_error_renders_no_data_regardless_of_prior_state() {
        let fake = FakeTransport::new();
        let store = store();
        let r = runner(NowPlayingSource::new("/logo.png"), &fake, &store);

        fake.respond(
            Method::Get,
            paths::STATUS,
            json!({"title": "Blue", "artist": "Joni Mitchell", "album": "Blue", "cover_url": "/c.jpg"}),
        );
        r.fetch_and_apply().await.unwrap();
        assert!(store.read().await.track.track().is_some());

        fake.respond(Method::Get, paths::STATUS, json!({"error": true}));
        r.fetch_and_apply().await.unwrap();

        let s = store.snapshot().await;
        assert_eq!(s.track, TrackSnapshot::NoData);
        assert_eq!(s.now_playing.title, NO_DATA);
        assert_eq!(s.now_playing.artist, "");
        assert_eq!(s.now_playing.album, "");
        assert_eq!(s.now_playing.cover_url, "/logo.png");
    }

    #[tokio::test]
    async fn test_now_playing_network_failure_degrades() {
        let fake = FakeTransport::new();
        let store = store();
        fake.respond_with(
            Method::Get,
            paths::STATUS,
            Err(SyncError::Network("connection refused".to_string())),
        );
        let r = runner(NowPlayingSource::new("/logo.png"), &fake, &store);
        assert!(matches!(r.fetch_and_apply().await, Err(SyncError::Network(_))));

        let s = store.snapshot().await;
        assert_eq!(s.now_playing.title, STATUS_LOAD_ERROR);
        assert_eq!(s.track, TrackSnapshot::NoData);
    }

    #[tokio::test]
    async fn test_recognizer_status_drives_toggle() {
        let fake = FakeTransport::new();
        let store = store();
        let r = runner(RecognizerSource, &fake, &store);

        fake.respond(Method::Get, paths::RECOGNIZER_STATUS, json!({"running": true}));
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert!(s.recognizer.toggle_on);
        assert_eq!(s.recognizer.state, RecognizerState::Running);
        assert_eq!(s.recognizer.status_text, RECOGNIZER_RUNNING);

        fake.respond(Method::Get, paths::RECOGNIZER_STATUS, json!({"running": false}));
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert!(!s.recognizer.toggle_on);
        assert_eq!(s.recognizer.status_text, RECOGNIZER_STOPPED);

        fake.respond_with(
            Method::Get,
            paths::RECOGNIZER_STATUS,
            Ok(ApiResponse::with_status(500, serde_json::Value::Null)),
        );
        assert!(r.fetch_and_apply().await.is_err());
        let s = store.snapshot().await;
        assert_eq!(s.recognizer.state, RecognizerState::Unknown);
        assert_eq!(s.recognizer.status_text, RECOGNIZER_ERROR);
    }

    #[tokio::test]
    async fn test_device_status_defaults_and_unreachable() {
        let fake = FakeTransport::new();
        let store = store();
        let r = runner(DeviceStatusSource::new("/api/pixoo/status"), &fake, &store);

        fake.respond(Method::Get, "/api/pixoo/status", json!({"ok": true, "online": true}));
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert_eq!(s.device.brightness, Provisional::Confirmed(50));
        assert_eq!(s.device.channel, Provisional::Confirmed(3));
        assert_eq!(s.device.status_text, "Connected to Pixoo");
        assert_eq!(s.device.status_sub, "Brightness: 50% – Channel: 3");
        assert!(s.device.refreshed_at.is_some());

        fake.respond_with(
            Method::Get,
            "/api/pixoo/status",
            Ok(ApiResponse::with_status(
                500,
                json!({"ok": false, "online": false, "error": "Pixoo not reachable"}),
            )),
        );
        assert!(matches!(
            r.fetch_and_apply().await,
            Err(SyncError::DeviceUnreachable(_))
        ));
        let s = store.snapshot().await;
        assert_eq!(s.device.status_text, DEVICE_UNREACHABLE);
        assert_eq!(s.device.status_sub, "Pixoo not reachable");
        assert!(!s.device.device.as_ref().unwrap().reachable);
        // Last confirmed values stay on screen.
        assert_eq!(s.device.brightness.displayed(), Some(&50));
    }

    #[tokio::test]
    async fn test_device_state_endpoint_variant() {
        let fake = FakeTransport::new();
        let store = store();
        fake.respond(
            Method::Get,
            "/api/pixoo/state",
            json!({"ok": true, "reachable": true, "brightness": 20, "channel": 1, "device_name": "Desk"}),
        );
        let r = runner(DeviceStatusSource::new("/api/pixoo/state"), &fake, &store);
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert_eq!(s.device.status_text, "Connected to Desk");
        assert_eq!(
            s.device.device,
            Some(DeviceState {
                reachable: true,
                brightness: 20,
                channel: 1,
                device_name: Some("Desk".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_touch_other_sources() {
        let fake = FakeTransport::new();
        let store = store();
        fake.respond(Method::Get, paths::STATUS, json!({"title": "So What", "artist": "Miles Davis"}));
        runner(NowPlayingSource::new("/logo.png"), &fake, &store)
            .fetch_and_apply()
            .await
            .unwrap();
        let before = store.snapshot().await;

        fake.respond_with(Method::Get, "/api/pixoo/status", Err(SyncError::Network("down".to_string())));
        let _ = runner(DeviceStatusSource::new("/api/pixoo/status"), &fake, &store)
            .fetch_and_apply()
            .await;

        let after = store.snapshot().await;
        assert_eq!(after.now_playing, before.now_playing);
        assert_eq!(after.track, before.track);
        assert_eq!(after.device.status_text, DEVICE_LOAD_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_response_is_discarded() {
        let fake = FakeTransport::new();
        let store = store();
        fake.respond_once(
            Method::Get,
            paths::STATUS,
            Duration::from_millis(500),
            Ok(ApiResponse::ok(json!({"title": "Old", "artist": "Band"}))),
        );
        fake.respond_once(
            Method::Get,
            paths::STATUS,
            Duration::from_millis(10),
            Ok(ApiResponse::ok(json!({"title": "New", "artist": "Band"}))),
        );
        let r = Arc::new(runner(NowPlayingSource::new("/logo.png"), &fake, &store));

        let first = tokio::spawn({
            let r = r.clone();
            async move { r.fetch_and_apply().await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let r = r.clone();
            async move { r.fetch_and_apply().await }
        });

        assert_eq!(second.await.unwrap(), Ok(FetchOutcome::Applied));
        assert_eq!(first.await.unwrap(), Ok(FetchOutcome::Stale));
        assert_eq!(store.read().await.now_playing.title, "New");
    }

    #[tokio::test]
    async fn test_stats_lists_and_empty_state() {
        let fake = FakeTransport::new();
        let store = store();
        let songs: Vec<_> = (1..=8)
            .map(|i| json!({"title": format!("Song {}", i), "artist": "Can", "count": 10 - i}))
            .collect();
        fake.respond(
            Method::Get,
            paths::STATS,
            json!({"top_songs": songs, "top_artists": [{"name": "Can", "count": 36}], "top_albums": []}),
        );
        let r = runner(StatsSource, &fake, &store);
        r.fetch_and_apply().await.unwrap();

        let s = store.snapshot().await;
        assert_eq!(s.stats.songs.len(), 8);
        assert_eq!(s.stats.songs.visible().len(), 5);
        assert_eq!(s.stats.songs.visible()[0].sublabel.as_deref(), Some("Can"));
        assert_eq!(s.stats.artists.visible()[0].rank, 1);
        assert_eq!(s.stats.empty_message, None);

        fake.respond(Method::Get, paths::STATS, json!({}));
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert!(s.stats.songs.is_empty());
        assert_eq!(s.stats.empty_message.as_deref(), Some(STATS_EMPTY));
    }

    #[tokio::test]
    async fn test_liked_gifs() {
        let fake = FakeTransport::new();
        let store = store();
        let r = runner(LikedGifsSource, &fake, &store);

        fake.respond(
            Method::Get,
            paths::PIXOO_LIKED_GIFS,
            json!({"ok": true, "gifs": [{"file_id": "g1", "file_name": "Cat"}, {"file_id": "g2"}]}),
        );
        r.fetch_and_apply().await.unwrap();
        let s = store.snapshot().await;
        assert_eq!(s.likes.gifs.len(), 2);
        assert_eq!(s.likes.status_text, "Loaded 2 GIF(s).");

        fake.respond(Method::Get, paths::PIXOO_LIKED_GIFS, json!({"ok": true, "gifs": []}));
        r.fetch_and_apply().await.unwrap();
        assert_eq!(store.read().await.likes.status_text, "No liked GIFs found.");

        fake.respond_with(
            Method::Get,
            paths::PIXOO_LIKED_GIFS,
            Ok(ApiResponse::with_status(500, json!({"ok": false, "error": "cloud login failed"}))),
        );
        assert_eq!(
            r.fetch_and_apply().await,
            Err(SyncError::DeviceUnreachable("cloud login failed".to_string()))
        );
        assert_eq!(store.read().await.likes.status_text, "Error loading liked GIFs.");
    }
}
