//! DashboardState: everything the view layer renders, behind one store.
//!
//! Components never share mutable state directly.  Each writer (a status
//! source's completion handler, a command, the lyrics fetcher) updates its
//! own field group inside a single `StateStore::update` call, so readers
//! never observe a half-applied snapshot.  Every update bumps `rev` and
//! notifies subscribers.

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};
use vinyl_proto::protocol::{FallbackImage, LikedGif};

use crate::collection::{ExpandableCollection, RankedListItem};
use crate::intent::Provisional;
use crate::visibility::Visibility;

// ── Track ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub cover_url: String,
}

/// The current track, as of the most recent successful status poll.
/// Replaced wholesale on every poll, never patched field by field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrackSnapshot {
    #[default]
    NoData,
    Playing(Track),
}

impl TrackSnapshot {
    pub fn track(&self) -> Option<&Track> {
        match self {
            Self::NoData => None,
            Self::Playing(t) => Some(t),
        }
    }

    /// `(artist, title)` trimmed, only when both are non-empty.
    pub fn lookup_key(&self) -> Option<(String, String)> {
        let track = self.track()?;
        let artist = track.artist.trim();
        let title = track.title.trim();
        if artist.is_empty() || title.is_empty() {
            return None;
        }
        Some((artist.to_string(), title.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_url: String,
}

// ── Recognizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizerState {
    Running,
    Stopped,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerView {
    pub state: RecognizerState,
    pub toggle_on: bool,
    /// False while a start/stop request is outstanding.
    pub toggle_enabled: bool,
    pub pending: bool,
    pub status_text: String,
}

impl Default for RecognizerView {
    fn default() -> Self {
        Self {
            state: RecognizerState::Unknown,
            toggle_on: false,
            toggle_enabled: true,
            pending: false,
            status_text: String::new(),
        }
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// Device settings as last read back from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub reachable: bool,
    pub brightness: u8,
    pub channel: u32,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceView {
    /// Authoritative copy; `None` until the first successful refresh.
    pub device: Option<DeviceState>,
    pub brightness: Provisional<u8>,
    pub channel: Provisional<u32>,
    pub status_text: String,
    pub status_sub: String,
    /// Feedback from the most recent brightness/channel/play command.
    pub command_status: String,
    pub discover_status: String,
    pub reboot_status: String,
    pub reboot_enabled: bool,
    pub refreshed_at: Option<DateTime<Local>>,
}

impl Default for DeviceView {
    fn default() -> Self {
        Self {
            device: None,
            brightness: Provisional::Unknown,
            channel: Provisional::Unknown,
            status_text: String::new(),
            status_sub: String::new(),
            command_status: String::new(),
            discover_status: String::new(),
            reboot_status: String::new(),
            reboot_enabled: true,
            refreshed_at: None,
        }
    }
}

// ── Lyrics ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LyricsView {
    pub visible: bool,
    pub text: String,
    pub collapsed: bool,
    pub toggle_visible: bool,
    /// Search page opened when no lyrics were found.
    pub external_link: Option<String>,
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsList {
    Songs,
    Artists,
    Albums,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsView {
    pub songs: ExpandableCollection<RankedListItem>,
    pub artists: ExpandableCollection<RankedListItem>,
    pub albums: ExpandableCollection<RankedListItem>,
    /// Shown in place of all three lists when there is nothing to rank.
    pub empty_message: Option<String>,
}

impl StatsView {
    pub fn new(limit: usize) -> Self {
        Self {
            songs: ExpandableCollection::new(limit),
            artists: ExpandableCollection::new(limit),
            albums: ExpandableCollection::new(limit),
            empty_message: None,
        }
    }

    pub fn list_mut(&mut self, which: StatsList) -> &mut ExpandableCollection<RankedListItem> {
        match which {
            StatsList::Songs => &mut self.songs,
            StatsList::Artists => &mut self.artists,
            StatsList::Albums => &mut self.albums,
        }
    }
}

// ── Liked GIFs / settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LikesView {
    pub gifs: Vec<LikedGif>,
    pub status_text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingsView {
    /// The server's configuration document, as last loaded.
    pub document: Option<Value>,
    pub status_text: String,
    pub gallery: Vec<FallbackImage>,
    pub gallery_status: String,
}

// ── DashboardState ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    /// Bumped on every update.
    pub rev: u64,
    pub visibility: Visibility,
    pub track: TrackSnapshot,
    pub now_playing: NowPlayingView,
    pub recognizer: RecognizerView,
    pub device: DeviceView,
    pub lyrics: LyricsView,
    pub stats: StatsView,
    pub likes: LikesView,
    pub settings: SettingsView,
}

impl DashboardState {
    pub fn new(stats_limit: usize, placeholder_cover: &str) -> Self {
        Self {
            rev: 0,
            visibility: Visibility::Visible,
            track: TrackSnapshot::NoData,
            now_playing: NowPlayingView {
                title: String::new(),
                artist: String::new(),
                album: String::new(),
                cover_url: placeholder_cover.to_string(),
            },
            recognizer: RecognizerView::default(),
            device: DeviceView::default(),
            lyrics: LyricsView::default(),
            stats: StatsView::new(stats_limit),
            likes: LikesView::default(),
            settings: SettingsView::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Updated { rev: u64 },
}

/// Single owner of `DashboardState`.  Cheap to clone; clones share the state.
#[derive(Clone)]
pub struct StateStore {
    state: Arc<RwLock<DashboardState>>,
    events: broadcast::Sender<StateEvent>,
}

impl StateStore {
    pub fn new(initial: DashboardState) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(initial)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, DashboardState> {
        self.state.read().await
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    /// Apply `f` under the write lock, bump `rev`, then notify subscribers.
    pub async fn update<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> R {
        let (result, rev) = {
            let mut state = self.state.write().await;
            let result = f(&mut state);
            state.rev += 1;
            (result, state.rev)
        };
        let _ = self.events.send(StateEvent::Updated { rev });
        result
    }
}

/// Drain every queued notification.  Returns the newest revision seen, or
/// `None` when nothing changed since the last call.  A lagged receiver
/// still counts as changed.
pub fn take_changes(rx: &mut broadcast::Receiver<StateEvent>) -> Option<u64> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(StateEvent::Updated { rev }) => latest = Some(rev),
            Err(broadcast::error::TryRecvError::Lagged(_)) => latest = latest.or(Some(0)),
            Err(_) => return latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, title: &str) -> TrackSnapshot {
        TrackSnapshot::Playing(Track {
            artist: artist.to_string(),
            title: title.to_string(),
            album: String::new(),
            cover_url: "/logo.png".to_string(),
        })
    }

    #[test]
    fn test_lookup_key_requires_artist_and_title() {
        assert_eq!(TrackSnapshot::NoData.lookup_key(), None);
        assert_eq!(track("  ", "Song").lookup_key(), None);
        assert_eq!(
            track(" Nina Simone ", "Sinnerman").lookup_key(),
            Some(("Nina Simone".to_string(), "Sinnerman".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_bumps_rev_and_notifies() {
        let store = StateStore::new(DashboardState::new(5, "/logo.png"));
        let mut rx = store.subscribe();

        let rev = store
            .update(|s| {
                s.device.status_text = "Pixoo not reachable.".to_string();
                s.rev
            })
            .await;
        assert_eq!(rev, 0);
        assert_eq!(rx.recv().await.unwrap(), StateEvent::Updated { rev: 1 });
        assert_eq!(store.read().await.device.status_text, "Pixoo not reachable.");
    }

    #[tokio::test]
    async fn test_take_changes_reports_newest_revision() {
        let store = StateStore::new(DashboardState::new(5, "/logo.png"));
        let mut rx = store.subscribe();
        assert_eq!(take_changes(&mut rx), None);

        store.update(|s| s.likes.status_text = "Loading liked GIFs...".to_string()).await;
        store.update(|s| s.likes.status_text = "Loaded 2 GIF(s).".to_string()).await;
        assert_eq!(take_changes(&mut rx), Some(2));
        assert_eq!(take_changes(&mut rx), None);
    }
}
