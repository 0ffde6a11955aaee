//! CommandDispatcher: imperative device actions with optimistic updates.
//!
//! Every action follows the same shape: validate locally, apply the
//! optimistic guess, POST, surface the outcome as status text, then run
//! exactly one reconciling refresh of the owning poller.  The refresh is
//! the authority; whatever it reads back replaces the guess.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vinyl_proto::protocol::{
    paths, Ack, BrightnessRequest, ChannelRequest, DiscoverResponse, DiscoveredDevice, PlayRemoteRequest,
    BRIGHTNESS_MAX,
};

use crate::error::{CommandError, SyncError};
use crate::poller::Poller;
use crate::settings::SettingsClient;
use crate::state::{DashboardState, RecognizerState, StateStore};
use crate::transport::{device_ack, ApiRequest, SharedTransport};

/// Explicit user consent for destructive actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    SetBrightness(u8),
    SetChannel(u32),
    Reboot(Confirmation),
    /// Play a liked GIF by its cloud file id.
    PlayRemote(String),
}

impl DeviceAction {
    fn label(&self) -> &'static str {
        match self {
            Self::SetBrightness(_) => "brightness",
            Self::SetChannel(_) => "channel",
            Self::Reboot(_) => "reboot",
            Self::PlayRemote(_) => "play-remote",
        }
    }

    fn request(&self) -> ApiRequest {
        match self {
            Self::SetBrightness(b) => {
                ApiRequest::post(paths::PIXOO_BRIGHTNESS).with_json(&BrightnessRequest { brightness: *b })
            }
            Self::SetChannel(c) => ApiRequest::post(paths::PIXOO_CHANNEL).with_json(&ChannelRequest { channel: *c }),
            Self::Reboot(_) => ApiRequest::post(paths::PIXOO_REBOOT),
            Self::PlayRemote(id) => {
                ApiRequest::post(paths::PIXOO_PLAY_REMOTE).with_json(&PlayRemoteRequest { file_id: id.clone() })
            }
        }
    }
}

/// Steps of the discover-and-save workflow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Discover,
    Persist,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReport {
    /// Set once the discover step succeeded.
    pub device: Option<DiscoveredDevice>,
    /// The first step that failed; later steps were skipped.
    pub failed: Option<(WorkflowStep, SyncError)>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    /// A device was found but a later step failed.
    pub fn is_partial(&self) -> bool {
        self.device.is_some() && self.failed.is_some()
    }
}

pub const REBOOTING: &str = "Rebooting...";
pub const REBOOT_SENT: &str = "Reboot command sent.";
pub const REBOOT_FAILED: &str = "Error while rebooting.";
pub const SELECT_GIF_FIRST: &str = "Please select a GIF first.";
pub const CHANGING_STATUS: &str = "Changing status...";
pub const SEARCHING_DEVICE: &str = "Searching device via Divoom cloud...";

pub struct CommandDispatcher {
    transport: SharedTransport,
    store: StateStore,
    settings: Arc<SettingsClient>,
    device_poller: Arc<Poller>,
    recognizer_poller: Arc<Poller>,
    reboot_cooldown: Duration,
}

impl CommandDispatcher {
    pub fn new(
        transport: SharedTransport,
        store: StateStore,
        settings: Arc<SettingsClient>,
        device_poller: Arc<Poller>,
        recognizer_poller: Arc<Poller>,
        reboot_cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            settings,
            device_poller,
            recognizer_poller,
            reboot_cooldown,
        }
    }

    /// Send one device action.  Local rejections (validation, missing
    /// confirmation, reboot cooldown) return before any request or refresh.
    pub async fn send(&self, action: DeviceAction) -> Result<Ack, CommandError> {
        let accepted = match check(&action) {
            // The reboot gate is tested and closed in the same update.
            Ok(()) => self.store.update(|s| claim_and_apply(s, &action)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = accepted {
            if let DeviceAction::PlayRemote(_) = action {
                self.store
                    .update(|s| s.likes.status_text = SELECT_GIF_FIRST.to_string())
                    .await;
            }
            return Err(e);
        }
        info!("Command: {:?}", action);

        let result = match self.transport.send(action.request()).await {
            Ok(response) => device_ack(response),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!("Command: {} failed: {}", action.label(), e);
        }

        let reenable_reboot = matches!(action, DeviceAction::Reboot(_)) && result.is_ok();
        self.store.update(|s| apply_outcome(s, &action, &result)).await;
        if reenable_reboot {
            self.schedule_reboot_reenable();
        }

        self.reconcile(&self.device_poller).await;
        result.map_err(CommandError::from)
    }

    fn schedule_reboot_reenable(&self) {
        let store = self.store.clone();
        let cooldown = self.reboot_cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            store.update(|s| s.device.reboot_enabled = true).await;
        });
    }

    async fn reconcile(&self, poller: &Poller) {
        if let Err(e) = poller.trigger_now().await {
            warn!("Command: {} refresh after command failed: {}", poller.name(), e);
        }
    }

    /// Start or stop the recognizer.  Rejected with `Busy` while a previous
    /// toggle has not resolved.
    pub async fn set_recognizer(&self, should_run: bool) -> Result<(), CommandError> {
        self.store
            .update(|s| {
                let view = &mut s.recognizer;
                if view.pending {
                    return Err(CommandError::Busy("recognizer"));
                }
                view.pending = true;
                view.toggle_enabled = false;
                view.toggle_on = should_run;
                view.status_text = CHANGING_STATUS.to_string();
                Ok(())
            })
            .await?;

        let path = if should_run {
            paths::RECOGNIZER_START
        } else {
            paths::RECOGNIZER_STOP
        };
        info!("Command: recognizer {}", if should_run { "start" } else { "stop" });
        let result = match self.transport.send(ApiRequest::post(path)).await {
            Ok(response) => response.into_body().map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!("Command: recognizer toggle failed: {}", e);
        }

        self.reconcile(&self.recognizer_poller).await;
        self.store
            .update(|s| {
                let view = &mut s.recognizer;
                view.pending = false;
                view.toggle_enabled = true;
                if view.state == RecognizerState::Unknown {
                    view.toggle_on = false;
                }
            })
            .await;
        result.map_err(CommandError::from)
    }

    /// Discover → Persist → Refresh.  Stops at the first failing step; the
    /// device refresh runs exactly once whatever happened before it.
    pub async fn discover_and_save(&self) -> DiscoveryReport {
        self.store
            .update(|s| s.device.discover_status = SEARCHING_DEVICE.to_string())
            .await;

        let mut report = DiscoveryReport {
            device: None,
            failed: None,
        };

        match self.discover().await {
            Ok(device) => {
                info!(
                    "Command: discovered {} at {}",
                    device.display_name(),
                    device.device_private_ip.as_deref().unwrap_or("?")
                );
                if let Err(e) = self.settings.persist_device_identity(&device).await {
                    report.failed = Some((WorkflowStep::Persist, e));
                }
                report.device = Some(device);
            }
            Err(e) => report.failed = Some((WorkflowStep::Discover, e)),
        }

        let refresh = self.device_poller.trigger_now().await;
        if report.failed.is_none() {
            if let Err(e) = refresh {
                report.failed = Some((WorkflowStep::Refresh, e));
            }
        }
        if let Some((step, e)) = &report.failed {
            warn!("Command: discovery failed at {:?}: {}", step, e);
        }

        let text = discovery_text(&report);
        self.store.update(|s| s.device.discover_status = text).await;
        report
    }

    async fn discover(&self) -> Result<DiscoveredDevice, SyncError> {
        let response = self.transport.send(ApiRequest::post(paths::PIXOO_DISCOVER)).await?;
        let discovered: DiscoverResponse = response.parse_object()?;
        if !discovered.ok {
            return Err(SyncError::DeviceUnreachable(
                discovered.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        discovered
            .device
            .ok_or_else(|| SyncError::Protocol("discovery response has no device".to_string()))
    }
}

/// Checks that need no state.
fn check(action: &DeviceAction) -> Result<(), CommandError> {
    match action {
        DeviceAction::PlayRemote(id) if id.trim().is_empty() => {
            Err(SyncError::Validation(SELECT_GIF_FIRST.to_string()).into())
        }
        DeviceAction::SetBrightness(b) if *b > BRIGHTNESS_MAX => Err(SyncError::Validation(format!(
            "brightness must be between 0 and {}",
            BRIGHTNESS_MAX
        ))
        .into()),
        DeviceAction::Reboot(Confirmation::Denied) => Err(CommandError::NotConfirmed("reboot")),
        _ => Ok(()),
    }
}

fn claim_and_apply(state: &mut DashboardState, action: &DeviceAction) -> Result<(), CommandError> {
    if matches!(action, DeviceAction::Reboot(_)) && !state.device.reboot_enabled {
        return Err(CommandError::Busy("reboot"));
    }
    apply_optimistic(state, action);
    Ok(())
}

fn apply_optimistic(state: &mut DashboardState, action: &DeviceAction) {
    let device = &mut state.device;
    match action {
        DeviceAction::SetBrightness(b) => device.brightness.guess(*b),
        DeviceAction::SetChannel(c) => device.channel.guess(*c),
        DeviceAction::Reboot(_) => {
            device.reboot_enabled = false;
            device.reboot_status = REBOOTING.to_string();
        }
        DeviceAction::PlayRemote(_) => state.likes.status_text = "Sending GIF to Pixoo...".to_string(),
    }
}

fn apply_outcome(state: &mut DashboardState, action: &DeviceAction, result: &Result<Ack, SyncError>) {
    let device = &mut state.device;
    match (action, result) {
        (DeviceAction::SetBrightness(b), Ok(_)) => device.command_status = format!("Brightness set to {}%", b),
        (DeviceAction::SetBrightness(_), Err(e)) => {
            device.command_status = format!("Error setting brightness. {}", e.detail())
        }
        (DeviceAction::SetChannel(c), Ok(_)) => device.command_status = format!("Channel switched to {}", c),
        (DeviceAction::SetChannel(_), Err(e)) => {
            device.command_status = format!("Error setting channel. {}", e.detail())
        }
        (DeviceAction::Reboot(_), Ok(_)) => device.reboot_status = REBOOT_SENT.to_string(),
        (DeviceAction::Reboot(_), Err(_)) => {
            device.reboot_status = REBOOT_FAILED.to_string();
            device.reboot_enabled = true;
        }
        (DeviceAction::PlayRemote(_), Ok(_)) => {
            state.likes.status_text = "GIF should now be playing on Pixoo.".to_string()
        }
        (DeviceAction::PlayRemote(_), Err(_)) => state.likes.status_text = "Error while sending GIF.".to_string(),
    }
}

fn discovery_text(report: &DiscoveryReport) -> String {
    let found = report.device.as_ref().map(|d| {
        let ip = d.device_private_ip.as_deref().unwrap_or("unknown IP");
        let id = d.device_id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string());
        format!("Found {} at {} (DeviceId {})", d.display_name(), ip, id)
    });
    match (&found, &report.failed) {
        (Some(found), None) | (Some(found), Some((WorkflowStep::Refresh, _))) => {
            format!("{} and saved to config.", found)
        }
        (Some(found), Some((_, e))) => format!("{}, but saving to config failed: {}", found, e.detail()),
        (None, Some((_, e))) => format!("Error: {}", e.detail()),
        (None, None) => "Error: Unknown error".to_string(),
    }
}
