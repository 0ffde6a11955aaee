//! Scripted transport for unit tests.  Pair with `start_paused = true` so
//! response delays run on the virtual clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::error::SyncError;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

#[derive(Clone)]
struct Scripted {
    delay: Duration,
    result: Result<ApiResponse, SyncError>,
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Scripted>,
    fallback: Option<Scripted>,
}

#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every `method path` request with `200 body`.
    pub fn respond(&self, method: Method, path: &str, body: Value) {
        self.respond_with(method, path, Ok(ApiResponse::ok(body)));
    }

    pub fn respond_with(&self, method: Method, path: &str, result: Result<ApiResponse, SyncError>) {
        let mut routes = self.routes.lock().unwrap();
        routes.entry((method, path.to_string())).or_default().fallback = Some(Scripted {
            delay: Duration::ZERO,
            result,
        });
    }

    /// Queue a one-shot answer, used before the standing one.
    pub fn respond_once(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        result: Result<ApiResponse, SyncError>,
    ) {
        let mut routes = self.routes.lock().unwrap();
        routes
            .entry((method, path.to_string()))
            .or_default()
            .queue
            .push_back(Scripted { delay, result });
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last(&self, method: Method, path: &str) -> Option<ApiRequest> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .cloned()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<ApiResponse, SyncError>> {
        let scripted = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .get_mut(&(request.method, request.path.clone()))
                .and_then(|route| route.queue.pop_front().or_else(|| route.fallback.clone()))
        };
        self.log.lock().unwrap().push(request);
        async move {
            let Some(scripted) = scripted else {
                return Ok(ApiResponse::with_status(404, Value::Null));
            };
            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            scripted.result
        }
        .boxed()
    }
}

/// Let spawned tasks run to completion on the paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
