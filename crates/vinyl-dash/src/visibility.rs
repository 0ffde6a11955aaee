//! Pauses every registered poller while the dashboard is hidden.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::lock;
use crate::poller::Poller;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

pub struct VisibilityGovernor {
    pollers: Mutex<Vec<Arc<Poller>>>,
    visibility: Mutex<Visibility>,
}

impl VisibilityGovernor {
    pub fn new() -> Self {
        Self {
            pollers: Mutex::new(Vec::new()),
            visibility: Mutex::new(Visibility::Visible),
        }
    }

    /// Registered pollers are not started here; the first `Visible`
    /// transition (or an explicit `start`) does that.
    pub fn register(&self, poller: Arc<Poller>) {
        lock(&self.pollers).push(poller);
    }

    /// Stop everything on `Hidden`, start everything on `Visible`.
    /// Repeated transitions are safe because start/stop are idempotent.
    pub fn set_visibility(&self, visibility: Visibility) {
        *lock(&self.visibility) = visibility;
        let pollers = lock(&self.pollers).clone();
        info!("Visibility: {:?}, {} poller(s)", visibility, pollers.len());
        for poller in &pollers {
            match visibility {
                Visibility::Visible => poller.start(),
                Visibility::Hidden => poller.stop(),
            }
        }
    }

    pub fn visibility(&self) -> Visibility {
        *lock(&self.visibility)
    }

    /// Release every timer.  Used on teardown.
    pub fn shutdown(&self) {
        for poller in lock(&self.pollers).drain(..) {
            poller.stop();
        }
    }
}

impl Default for VisibilityGovernor {
    fn default() -> Self {
        Self::new()
    }
}
