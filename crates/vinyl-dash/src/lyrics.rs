//! On-demand lyrics for the current track.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use reqwest::Url;
use tracing::{debug, info, warn};
use vinyl_proto::protocol::{paths, LyricsResponse};

use crate::collection::Toggle;
use crate::error::SyncError;
use crate::lock;
use crate::state::{DashboardState, StateStore};
use crate::transport::{ApiRequest, SharedTransport};

pub const NO_TRACK: &str = "No track information available.";
pub const LOADING: &str = "Loading lyrics...";
pub const NOT_FOUND: &str = "No lyrics found. Opening Genius...";
pub const LOAD_ERROR: &str = "Error loading lyrics.";

/// Opens a URL outside the dashboard (browser, terminal hyperlink, ...).
pub trait ExternalOpener: Send + Sync + 'static {
    fn open(&self, url: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsOutcome {
    Shown,
    /// Nothing found; the search page was opened instead.
    FallbackOpened(String),
    /// Current track has no artist or title; nothing was requested.
    NoTrack,
    /// A request for the same track is still running.
    AlreadyLoading,
    /// The track changed while the request was out; the answer was dropped.
    Superseded,
    Failed(SyncError),
}

type TrackKey = (String, String);

pub struct LyricsFetcher {
    transport: SharedTransport,
    store: StateStore,
    search_url: String,
    opener: Arc<dyn ExternalOpener>,
    in_flight: Arc<Mutex<HashSet<TrackKey>>>,
}

/// Removes the key when the request resolves, however it resolves.
struct InFlight {
    set: Arc<Mutex<HashSet<TrackKey>>>,
    key: TrackKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.key);
    }
}

impl LyricsFetcher {
    pub fn new(
        transport: SharedTransport,
        store: StateStore,
        search_url: impl Into<String>,
        opener: Arc<dyn ExternalOpener>,
    ) -> Self {
        Self {
            transport,
            store,
            search_url: search_url.into(),
            opener,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Look up lyrics for whatever the latest status poll says is playing.
    pub async fn fetch(&self) -> LyricsOutcome {
        let key = self.store.read().await.track.lookup_key();
        let Some((artist, title)) = key else {
            self.store
                .update(|s| {
                    s.lyrics.visible = true;
                    s.lyrics.text = NO_TRACK.to_string();
                    s.lyrics.toggle_visible = false;
                    s.lyrics.external_link = None;
                })
                .await;
            return LyricsOutcome::NoTrack;
        };

        let key = (artist.clone(), title.clone());
        if !lock(&self.in_flight).insert(key.clone()) {
            return LyricsOutcome::AlreadyLoading;
        }
        let _guard = InFlight {
            set: self.in_flight.clone(),
            key,
        };

        self.store
            .update(|s| {
                s.lyrics.visible = true;
                s.lyrics.text = LOADING.to_string();
                s.lyrics.toggle_visible = false;
                s.lyrics.external_link = None;
            })
            .await;
        info!("Lyrics: looking up {} - {}", artist, title);

        let request = ApiRequest::get(paths::LYRICS)
            .with_query("artist", artist.as_str())
            .with_query("title", title.as_str());
        let response = match self.transport.send(request).await {
            Ok(r) => r.parse_object::<LyricsResponse>(),
            Err(e) => Err(e),
        };

        let current = (artist.as_str(), title.as_str());
        match response {
            Ok(LyricsResponse {
                ok: true,
                lyrics: Some(text),
                ..
            }) if !text.trim().is_empty() => {
                let shown = self
                    .apply_for(current, |s| {
                        s.lyrics.text = text;
                        s.lyrics.collapsed = true;
                        s.lyrics.toggle_visible = true;
                    })
                    .await;
                if shown {
                    LyricsOutcome::Shown
                } else {
                    LyricsOutcome::Superseded
                }
            }
            Ok(_) => self.open_search(current).await,
            Err(e) => {
                warn!("Lyrics: lookup failed: {}", e);
                if self.apply_for(current, |s| s.lyrics.text = LOAD_ERROR.to_string()).await {
                    LyricsOutcome::Failed(e)
                } else {
                    LyricsOutcome::Superseded
                }
            }
        }
    }

    /// Run `f` only if `(artist, title)` is still what is playing.
    async fn apply_for(&self, (artist, title): (&str, &str), f: impl FnOnce(&mut DashboardState)) -> bool {
        self.store
            .update(|s| {
                let still_playing = s
                    .track
                    .lookup_key()
                    .is_some_and(|(a, t)| a == artist && t == title);
                if still_playing {
                    f(s);
                } else {
                    debug!("Lyrics: dropping answer for {} - {}, track changed", artist, title);
                }
                still_playing
            })
            .await
    }

    async fn open_search(&self, current: (&str, &str)) -> LyricsOutcome {
        let url = match search_url(&self.search_url, current.0, current.1) {
            Ok(url) => url,
            Err(e) => {
                if !self.apply_for(current, |s| s.lyrics.text = LOAD_ERROR.to_string()).await {
                    return LyricsOutcome::Superseded;
                }
                return LyricsOutcome::Failed(e);
            }
        };
        let link = url.clone();
        let still_playing = self
            .apply_for(current, |s| {
                s.lyrics.text = NOT_FOUND.to_string();
                s.lyrics.external_link = Some(link);
            })
            .await;
        if !still_playing {
            return LyricsOutcome::Superseded;
        }
        info!("Lyrics: none found, opening {}", url);
        if let Err(e) = self.opener.open(&url) {
            warn!("Lyrics: could not open {}: {}", url, e);
        }
        LyricsOutcome::FallbackOpened(url)
    }

    /// Flip between the collapsed and full lyrics.  Returns the label the
    /// toggle should show next, or `None` when there is nothing to toggle.
    pub async fn toggle(&self) -> Option<Toggle> {
        self.store
            .update(|s| {
                if !s.lyrics.toggle_visible {
                    return None;
                }
                s.lyrics.collapsed = !s.lyrics.collapsed;
                Some(if s.lyrics.collapsed { Toggle::More } else { Toggle::Less })
            })
            .await
    }
}

fn search_url(base: &str, artist: &str, title: &str) -> Result<String, SyncError> {
    let query = format!("{} {}", artist, title);
    Url::parse_with_params(base, &[("q", query.as_str())])
        .map(String::from)
        .map_err(|e| SyncError::Validation(format!("bad lyrics search URL {:?}: {}", base, e)))
}
