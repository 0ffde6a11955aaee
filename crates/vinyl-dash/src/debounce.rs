//! Debouncer: coalesce rapid control input into one send per settle window.
//!
//! Each input replaces the pending value and restarts the settle timer.
//! When the timer fires the latest value is handed to the sink.  Sends are
//! serialized: a window that settles while the previous send is still in
//! flight waits for it, so payloads never overlap or arrive out of order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::lock;

pub type Sink<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending<T> {
    value: Option<T>,
    timer: Option<AbortHandle>,
    generation: u64,
}

pub struct Debouncer<T> {
    name: &'static str,
    settle: Duration,
    sink: Sink<T>,
    pending: Arc<Mutex<Pending<T>>>,
    send_gate: Arc<tokio::sync::Mutex<()>>,
}

impl<T: Clone + Send + 'static> Debouncer<T> {
    pub fn new(name: &'static str, settle: Duration, sink: Sink<T>) -> Self {
        Self {
            name,
            settle,
            sink,
            pending: Arc::new(Mutex::new(Pending {
                value: None,
                timer: None,
                generation: 0,
            })),
            send_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Record `value` as the latest input and restart the settle timer.
    pub fn notify_input(&self, value: T) {
        let mut pending = lock(&self.pending);
        pending.value = Some(value);
        pending.generation += 1;
        let generation = pending.generation;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let name = self.name;
        let settle = self.settle;
        let sink = self.sink.clone();
        let state = self.pending.clone();
        let gate = self.send_gate.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let value = {
                let mut pending = lock(&state);
                if pending.generation != generation {
                    return;
                }
                // Settled: later input must not cancel this send.
                pending.timer = None;
                pending.value.take()
            };
            let Some(value) = value else { return };

            let _sending = gate.lock().await;
            debug!("Debouncer: {} settled, sending", name);
            sink(value).await;
        });
        pending.timer = Some(task.abort_handle());
    }

    /// The value waiting for its settle window, if any.
    pub fn pending(&self) -> Option<T> {
        lock(&self.pending).value.clone()
    }

    /// Drop the pending value without sending it.
    pub fn cancel(&self) {
        lock(&self.pending).clear();
    }
}

impl<T> Pending<T> {
    fn clear(&mut self) {
        self.value = None;
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        lock(&self.pending).clear();
    }
}
