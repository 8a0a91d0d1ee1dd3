//! Request statistics served on `/stats`.
use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::body::Body as AxumBody;
use chrono::{DateTime, Utc};
use hyper::{Request, StatusCode};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::{ServiceExt, service_fn, util::BoxCloneSyncService};

use crate::ports::handler::BoxHandler;

/// Number of per-second throughput samples kept.
pub const HISTORY_LEN: usize = 60;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    #[serde(rename = "1xx")]
    pub informational: u64,
    #[serde(rename = "2xx")]
    pub success: u64,
    #[serde(rename = "3xx")]
    pub redirection: u64,
    #[serde(rename = "4xx")]
    pub client_error: u64,
    #[serde(rename = "5xx")]
    pub server_error: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started: DateTime<Utc>,
    pub uptime_secs: i64,
    pub requests: u64,
    pub status: StatusCounts,
    /// Requests completed in each of the last [`HISTORY_LEN`] seconds, oldest first.
    pub requests_per_second: Vec<u64>,
}

/// Request counters plus a ticker that samples throughput once a second.
pub struct Stats {
    started: DateTime<Utc>,
    requests: AtomicU64,
    by_class: [AtomicU64; 5],
    history: Mutex<VecDeque<u64>>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Utc::now(),
            requests: AtomicU64::new(0),
            by_class: Default::default(),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
            cancel: CancellationToken::new(),
            ticker: Mutex::new(None),
        })
    }

    /// Count one completed request.
    pub fn record(&self, status: StatusCode) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let class = (status.as_u16() / 100).clamp(1, 5) as usize - 1;
        self.by_class[class].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let count = |i: usize| self.by_class[i].load(Ordering::Relaxed);
        StatsSnapshot {
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds(),
            requests: self.requests.load(Ordering::Relaxed),
            status: StatusCounts {
                informational: count(0),
                success: count(1),
                redirection: count(2),
                client_error: count(3),
                server_error: count(4),
            },
            requests_per_second: self
                .history
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .iter()
                .copied()
                .collect(),
        }
    }

    fn push_sample(&self, sample: u64) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(sample);
    }

    /// Start the throughput ticker. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if ticker.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let stats = Arc::clone(self);
        let cancel = self.cancel.clone();
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = stats.requests.load(Ordering::Relaxed);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let total = stats.requests.load(Ordering::Relaxed);
                        stats.push_sample(total.saturating_sub(last));
                        last = total;
                    }
                }
            }
            tracing::debug!("stats ticker stopped");
        }));
    }

    /// Stop the ticker and wait for it to exit. Counters stay readable.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "stats ticker ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .ticker
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .is_some()
    }

    /// Count every response produced by `inner`.
    pub fn wrap(self: &Arc<Self>, inner: BoxHandler) -> BoxHandler {
        let stats = Arc::clone(self);
        BoxCloneSyncService::new(service_fn(move |req: Request<AxumBody>| {
            let inner = inner.clone();
            let stats = stats.clone();
            async move {
                let response = inner.oneshot(req).await?;
                stats.record(response.status());
                Ok::<_, Infallible>(response)
            }
        }))
    }
}
