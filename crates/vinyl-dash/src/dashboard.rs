//! Dashboard: wires sources, pollers, commands and helpers around one
//! shared `StateStore`.

use std::sync::Arc;

use futures_util::FutureExt;
use tracing::info;
use vinyl_proto::config::Config;
use vinyl_proto::protocol::{Ack, BRIGHTNESS_MAX};

use crate::collection::Toggle;
use crate::command::{CommandDispatcher, Confirmation, DeviceAction, DiscoveryReport};
use crate::debounce::{Debouncer, Sink};
use crate::error::{CommandError, SyncError};
use crate::lyrics::{ExternalOpener, LyricsFetcher, LyricsOutcome};
use crate::poller::Poller;
use crate::render;
use crate::settings::SettingsClient;
use crate::source::{
    DeviceStatusSource, LikedGifsSource, NowPlayingSource, RecognizerSource, SourceRunner, StatsSource,
};
use crate::state::{DashboardState, StateStore, StatsList};
use crate::transport::SharedTransport;
use crate::visibility::{Visibility, VisibilityGovernor};

pub struct Dashboard {
    store: StateStore,
    status_poller: Arc<Poller>,
    recognizer_poller: Arc<Poller>,
    device_poller: Arc<Poller>,
    stats_poller: Arc<Poller>,
    governor: VisibilityGovernor,
    dispatcher: Arc<CommandDispatcher>,
    settings: Arc<SettingsClient>,
    lyrics: LyricsFetcher,
    likes: SourceRunner,
    brightness: Debouncer<u8>,
    channel: Debouncer<u32>,
}

impl Dashboard {
    /// Build everything.  Nothing is fetched until `start()`.
    pub fn new(config: &Config, transport: SharedTransport, opener: Arc<dyn ExternalOpener>) -> Self {
        let store = StateStore::new(DashboardState::new(
            config.controls.stats_visible,
            &config.display.placeholder_cover,
        ));
        let status_poller = Arc::new(Poller::new("status").with_source(
            Arc::new(SourceRunner::new(
                NowPlayingSource::new(config.display.placeholder_cover.clone()),
                transport.clone(),
                store.clone(),
            )),
            config.polling.status_interval(),
        ));
        let recognizer_poller = Arc::new(Poller::new("recognizer").with_source(
            Arc::new(SourceRunner::new(RecognizerSource, transport.clone(), store.clone())),
            config.polling.recognizer_interval(),
        ));
        let device_poller = Arc::new(Poller::new("device").with_source(
            Arc::new(SourceRunner::new(
                DeviceStatusSource::new(config.polling.device_status_path.clone()),
                transport.clone(),
                store.clone(),
            )),
            config.polling.device_interval(),
        ));
        let stats_poller = Arc::new(Poller::new("stats").with_source(
            Arc::new(SourceRunner::new(StatsSource, transport.clone(), store.clone())),
            config.polling.stats_interval(),
        ));

        let governor = VisibilityGovernor::new();
        for poller in [&status_poller, &recognizer_poller, &device_poller, &stats_poller] {
            governor.register(poller.clone());
        }

        let settings = Arc::new(SettingsClient::new(transport.clone(), store.clone()));
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            store.clone(),
            settings.clone(),
            device_poller.clone(),
            recognizer_poller.clone(),
            config.controls.reboot_cooldown(),
        ));

        let brightness_sink: Sink<u8> = {
            let dispatcher = dispatcher.clone();
            Arc::new(move |value| {
                let dispatcher = dispatcher.clone();
                async move {
                    let _ = dispatcher.send(DeviceAction::SetBrightness(value)).await;
                }
                .boxed()
            })
        };
        let channel_sink: Sink<u32> = {
            let dispatcher = dispatcher.clone();
            Arc::new(move |value| {
                let dispatcher = dispatcher.clone();
                async move {
                    let _ = dispatcher.send(DeviceAction::SetChannel(value)).await;
                }
                .boxed()
            })
        };

        let lyrics = LyricsFetcher::new(
            transport.clone(),
            store.clone(),
            config.display.lyrics_search_url.clone(),
            opener,
        );
        let likes = SourceRunner::new(LikedGifsSource, transport, store.clone());

        Self {
            store,
            status_poller,
            recognizer_poller,
            device_poller,
            stats_poller,
            governor,
            dispatcher,
            settings,
            lyrics,
            likes,
            brightness: Debouncer::new("brightness", config.controls.settle(), brightness_sink),
            channel: Debouncer::new("channel", config.controls.settle(), channel_sink),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn settings(&self) -> &SettingsClient {
        &self.settings
    }

    pub fn pollers(&self) -> [&Arc<Poller>; 4] {
        [
            &self.status_poller,
            &self.recognizer_poller,
            &self.device_poller,
            &self.stats_poller,
        ]
    }

    pub async fn start(&self) {
        info!("Dashboard: starting");
        self.set_visibility(Visibility::Visible).await;
    }

    pub async fn set_visibility(&self, visibility: Visibility) {
        self.store.update(|s| s.visibility = visibility).await;
        self.governor.set_visibility(visibility);
    }

    /// Slider movement: show the value now, send it once input settles.
    pub async fn input_brightness(&self, value: u8) -> Result<(), CommandError> {
        if value > BRIGHTNESS_MAX {
            return Err(SyncError::Validation(format!(
                "brightness must be between 0 and {}",
                BRIGHTNESS_MAX
            ))
            .into());
        }
        self.store.update(|s| s.device.brightness.guess(value)).await;
        self.brightness.notify_input(value);
        Ok(())
    }

    /// Channel button: highlight it now, send once input settles.
    pub async fn input_channel(&self, channel: u32) {
        self.store.update(|s| s.device.channel.guess(channel)).await;
        self.channel.notify_input(channel);
    }

    pub async fn reboot(&self, confirmation: Confirmation) -> Result<Ack, CommandError> {
        self.dispatcher.send(DeviceAction::Reboot(confirmation)).await
    }

    pub async fn play_liked_gif(&self, file_id: &str) -> Result<Ack, CommandError> {
        self.dispatcher.send(DeviceAction::PlayRemote(file_id.to_string())).await
    }

    pub async fn discover_device(&self) -> DiscoveryReport {
        self.dispatcher.discover_and_save().await
    }

    pub async fn set_recognizer(&self, should_run: bool) -> Result<(), CommandError> {
        self.dispatcher.set_recognizer(should_run).await
    }

    pub async fn load_liked_gifs(&self) -> Result<(), SyncError> {
        self.store
            .update(|s| s.likes.status_text = "Loading liked GIFs...".to_string())
            .await;
        self.likes.fetch_and_apply().await.map(|_| ())
    }

    pub async fn fetch_lyrics(&self) -> LyricsOutcome {
        self.lyrics.fetch().await
    }

    pub async fn toggle_lyrics(&self) -> Option<Toggle> {
        self.lyrics.toggle().await
    }

    pub async fn refresh_stats(&self) -> Result<(), SyncError> {
        self.stats_poller.trigger_now().await
    }

    /// More/Less on one stats list.  `None` when the list fits its limit.
    pub async fn toggle_stats(&self, which: StatsList) -> Option<Toggle> {
        self.store
            .update(|s| {
                let list = s.stats.list_mut(which);
                list.toggle();
                list.toggle_control()
            })
            .await
    }

    pub async fn render(&self) -> String {
        render::render(&*self.store.read().await)
    }

    /// Release every timer.
    pub fn shutdown(&self) {
        info!("Dashboard: shutting down");
        self.brightness.cancel();
        self.channel.cancel();
        self.governor.shutdown();
    }
}
