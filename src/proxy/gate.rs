//! Serialized admission queue in front of the Overpass interpreter
//!
//! ```text
//! handler ─┐
//! handler ─┼─► QueueItem (mpsc, FIFO) ─► gate worker ─► cache recheck ─► upstream
//! handler ─┘          ▲                        │
//!                     └──── oneshot reply ◄────┘
//! ```
//!
//! One worker owns the dispatch clock. Every request shares the same queue
//! and the same minimum interval, whatever cell it targets. An item whose
//! key was satisfied while it waited is answered from the cache and does not
//! consume the interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::cache::{PersistentCache, overpass_cache_key};
use crate::error::UpstreamError;
use crate::upstream::{OverpassApi, ResponseSink, UpstreamResponse, UpstreamResult};

/// Gate tuning
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    /// Minimum spacing between upstream dispatches
    pub min_interval: Duration,
    /// Freshness window used by the dequeue recheck
    pub ttl: Duration,
}

/// Where a gated response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Satisfied from cache on dequeue
    Cache,
    /// Fetched and cached
    Upstream,
    /// Fetched; the query has no cache key
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct GateResponse {
    pub response: UpstreamResponse,
    pub source: ResponseSource,
}

struct QueueItem {
    cache_key: Option<String>,
    query: String,
    reply: oneshot::Sender<UpstreamResult<GateResponse>>,
}

/// Handle to the gate worker. Cheap to clone.
#[derive(Clone)]
pub struct UpstreamGate {
    tx: mpsc::UnboundedSender<QueueItem>,
    depth: Arc<AtomicUsize>,
}

impl UpstreamGate {
    /// Start the worker on the current tokio runtime. It exits once every
    /// handle has been dropped and the queue has drained.
    pub fn spawn(
        upstream: Arc<dyn OverpassApi>,
        cache: Arc<PersistentCache>,
        sink: Option<Arc<dyn ResponseSink>>,
        settings: GateSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker = GateWorker {
            upstream,
            cache,
            sink,
            settings,
            depth: Arc::clone(&depth),
            last_dispatch: None,
        };
        tokio::spawn(worker.run(rx));
        Self { tx, depth }
    }

    /// Items waiting to be dequeued
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Enqueue a query and wait for its turn
    pub async fn submit(&self, query: &str) -> UpstreamResult<GateResponse> {
        let (reply, rx) = oneshot::channel();
        let item = QueueItem {
            cache_key: overpass_cache_key(query),
            query: query.to_string(),
            reply,
        };

        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!(
            "Gate enqueue {} (depth {})",
            item.cache_key.as_deref().unwrap_or("<passthrough>"),
            depth
        );
        if self.tx.send(item).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(UpstreamError::GateClosed);
        }

        rx.await.map_err(|_| UpstreamError::GateClosed)?
    }
}

struct GateWorker {
    upstream: Arc<dyn OverpassApi>,
    cache: Arc<PersistentCache>,
    sink: Option<Arc<dyn ResponseSink>>,
    settings: GateSettings,
    depth: Arc<AtomicUsize>,
    last_dispatch: Option<Instant>,
}

impl GateWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
        while let Some(item) = rx.recv().await {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.handle(item).await;
        }
        log::debug!("Gate worker stopped");
    }

    async fn handle(&mut self, item: QueueItem) {
        if item.reply.is_closed() {
            log::debug!("Gate dropping abandoned request");
            return;
        }

        if let Some(ref key) = item.cache_key
            && let Some(entry) = self.cache.recheck(key, self.settings.ttl)
        {
            log::debug!("Gate short-circuit from cache: {}", key);
            let _ = item.reply.send(Ok(GateResponse {
                response: UpstreamResponse {
                    body: entry.payload,
                    content_type: entry.content_type,
                },
                source: ResponseSource::Cache,
            }));
            return;
        }

        if let Some(last) = self.last_dispatch {
            let ready_at = last + self.settings.min_interval;
            if ready_at > Instant::now() {
                log::debug!(
                    "Gate waiting {:?} before dispatch",
                    ready_at - Instant::now()
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_dispatch = Some(Instant::now());

        let result = self.upstream.interpreter(&item.query).await;
        let reply = match result {
            Ok(response) => {
                let source = match item.cache_key {
                    Some(ref key) => {
                        self.cache
                            .set(key, response.body.clone(), &response.content_type);
                        ResponseSource::Upstream
                    }
                    None => ResponseSource::Passthrough,
                };
                if let Some(ref sink) = self.sink {
                    sink.accept(item.cache_key.as_deref(), &response.body);
                }
                Ok(GateResponse { response, source })
            }
            Err(e) => {
                log::warn!(
                    "Gate fetch failed for {}: {}",
                    item.cache_key.as_deref().unwrap_or("<passthrough>"),
                    e
                );
                Err(e)
            }
        };
        let _ = item.reply.send(reply);
    }
}
