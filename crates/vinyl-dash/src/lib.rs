//! State synchronization and device-command engine for the vinyl
//! recognition dashboard.
//!
//! Independent pollers keep the now-playing, recognizer, device and stats
//! views fresh; user actions go through the command dispatcher and are
//! always followed by a reconciling refresh.  All view state lives in one
//! `StateStore`.

pub mod collection;
pub mod command;
pub mod dashboard;
pub mod debounce;
pub mod error;
pub mod intent;
pub mod lyrics;
pub mod poller;
pub mod render;
pub mod settings;
pub mod source;
pub mod state;
pub mod transport;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use dashboard::Dashboard;
pub use error::{CommandError, SyncError};

/// Lock a std mutex, ignoring poisoning.  Nothing guarded here can be left
/// half-written by a panicking holder.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
