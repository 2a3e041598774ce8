//! # Batch Scheduler
//!
//! One scheduler per configured endpoint owns the queue of pending logical
//! requests and decides when and how to send them.
//!
//! The scheduler moves through three states per collection cycle: idle (no
//! pending entries, no timer), collecting (at least one entry queued, the
//! one-shot collection timer armed), and flushing. A flush is triggered
//! either by the timer or by the queue reaching the configured maximum, and
//! atomically takes the queue so new submissions start a fresh cycle.
//!
//! At flush time, cancelled entries are dropped silently. If fewer entries
//! survive than `min_requests_per_batch`, each is dispatched as its own
//! physical request; otherwise they are folded into one multipart envelope,
//! the configured pre-send hook runs, and the single physical call is made.
//! Decoded responses are matched back to entries purely by position.
//!
//! Timer disarming works by generation: every flush bumps the queue's cycle
//! counter, and a timer only flushes the cycle it was armed for. A stale
//! timer firing after a max-size flush is a no-op. The queue lock is never
//! held across an await point.

use crate::codec::BatchCodec;
use crate::config::EndpointConfig;
use crate::transport::{Transport, TransportError};
use crate::types::{HttpRequest, HttpResponse};
use crate::{Error, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A queued logical request together with its result sink and cancellation
/// flag.
///
/// Delivers at most one terminal outcome, ever; if the caller has stopped
/// listening, delivery is a silent no-op.
pub struct PendingEntry {
    pub(crate) request: HttpRequest,
    pub(crate) sink: oneshot::Sender<Result<HttpResponse>>,
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl PendingEntry {
    /// Create an entry plus the receiving half of its result sink and the
    /// shared cancellation flag.
    pub fn new(
        request: HttpRequest,
    ) -> (
        Self,
        oneshot::Receiver<Result<HttpResponse>>,
        Arc<AtomicBool>,
    ) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (entry, receiver) = Self::with_cancellation(request, Arc::clone(&cancelled));
        (entry, receiver, cancelled)
    }

    /// Create an entry wired to an existing cancellation flag.
    pub fn with_cancellation(
        request: HttpRequest,
        cancelled: Arc<AtomicBool>,
    ) -> (Self, oneshot::Receiver<Result<HttpResponse>>) {
        let (sink, receiver) = oneshot::channel();
        let entry = Self {
            request,
            sink,
            cancelled,
        };
        (entry, receiver)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn deliver(self, outcome: Result<HttpResponse>) {
        // The receiver may already be gone; that is not an error.
        let _ = self.sink.send(outcome);
    }
}

/// Pending entries for the current collection cycle, plus the cycle counter
/// that keeps stale collection timers inert.
#[derive(Default)]
struct PendingQueue {
    entries: Vec<PendingEntry>,
    cycle: u64,
}

/// Per-endpoint batch scheduler.
///
/// Cheap to clone; clones share the same queue and configuration.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: Arc<EndpointConfig>,
    codec: Arc<dyn BatchCodec>,
    transport: Arc<dyn Transport>,
    pending: Mutex<PendingQueue>,
}

impl BatchScheduler {
    pub fn new(
        config: Arc<EndpointConfig>,
        codec: Arc<dyn BatchCodec>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                codec,
                transport,
                pending: Mutex::new(PendingQueue::default()),
            }),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Queue an entry for the current collection cycle.
    ///
    /// The first entry of a cycle arms the one-shot collection timer;
    /// reaching `max_requests_per_batch` flushes immediately, overriding it.
    pub async fn submit(&self, entry: PendingEntry) {
        let (queued, cycle) = {
            let mut pending = self.inner.pending.lock().expect("pending queue poisoned");
            pending.entries.push(entry);
            (pending.entries.len(), pending.cycle)
        };

        if queued == 1 {
            let inner = Arc::clone(&self.inner);
            let delay = self.inner.config.collection_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.flush_cycle(cycle).await;
            });
        }

        if queued >= self.inner.config.max_requests_per_batch {
            debug!(
                endpoint = %self.inner.config.batch_endpoint_url,
                queued, "queue reached max batch size, flushing"
            );
            self.inner.flush_now().await;
        }
    }

    /// Take the queue, disarm the collection timer, and dispatch the
    /// surviving entries.
    pub async fn flush(&self) {
        self.inner.flush_now().await;
    }
}

impl SchedulerInner {
    async fn flush_now(&self) {
        let taken = self.take_pending(None);
        self.dispatch(taken).await;
    }

    /// Timer-driven flush: only acts if `cycle` is still the one being
    /// collected.
    async fn flush_cycle(&self, cycle: u64) {
        let taken = self.take_pending(Some(cycle));
        self.dispatch(taken).await;
    }

    /// Atomically take the current cycle's entries and advance the cycle,
    /// which makes any timer armed for the old cycle a no-op. With
    /// `expected_cycle` set, takes nothing unless the cycle still matches.
    fn take_pending(&self, expected_cycle: Option<u64>) -> Vec<PendingEntry> {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        if let Some(expected) = expected_cycle {
            if pending.cycle != expected {
                return Vec::new();
            }
        }
        pending.cycle = pending.cycle.wrapping_add(1);
        std::mem::take(&mut pending.entries)
    }

    async fn dispatch(&self, taken: Vec<PendingEntry>) {
        let entries: Vec<PendingEntry> =
            taken.into_iter().filter(|e| !e.is_cancelled()).collect();
        if entries.is_empty() {
            return;
        }

        if entries.len() < self.config.min_requests_per_batch {
            debug!(
                endpoint = %self.config.batch_endpoint_url,
                count = entries.len(),
                "below min batch size, fanning out individually"
            );
            self.fan_out(entries).await;
        } else {
            debug!(
                endpoint = %self.config.batch_endpoint_url,
                count = entries.len(),
                "sending batched request"
            );
            self.dispatch_batch(entries).await;
        }
    }

    /// Send each entry as its own physical request; outcomes are whatever
    /// each request returns, independent of its siblings.
    async fn fan_out(&self, entries: Vec<PendingEntry>) {
        join_all(entries.into_iter().map(|entry| async move {
            let outcome = self
                .transport
                .perform(entry.request.clone())
                .await
                .map_err(Error::from);
            entry.deliver(outcome);
        }))
        .await;
    }

    /// Fold the entries into one envelope and demultiplex the combined
    /// response back to them by position.
    async fn dispatch_batch(&self, entries: Vec<PendingEntry>) {
        let requests: Vec<HttpRequest> = entries.iter().map(|e| e.request.clone()).collect();
        let mut envelope = match self.codec.encode(&requests) {
            Ok(envelope) => envelope,
            Err(error) => {
                let message = error.to_string();
                for entry in entries {
                    entry.deliver(Err(Error::Configuration(message.clone())));
                }
                return;
            }
        };

        if let Some(hook) = &self.config.on_before_send {
            hook(&mut envelope);
        }

        let combined = match self.transport.perform(envelope).await {
            Ok(combined) => combined,
            Err(error) => {
                warn!(
                    endpoint = %self.config.batch_endpoint_url,
                    %error, "batched physical call failed"
                );
                let message = error.to_string();
                for entry in entries {
                    entry.deliver(Err(Error::Transport(TransportError::Other(message.clone()))));
                }
                return;
            }
        };

        let parts = match self.codec.decode(&combined) {
            Ok(parts) => parts,
            Err(error) => {
                warn!(
                    endpoint = %self.config.batch_endpoint_url,
                    %error, "combined response could not be deframed"
                );
                let message = error.to_string();
                for entry in entries {
                    entry.deliver(Err(Error::Framing(message.clone())));
                }
                return;
            }
        };

        if parts.len() > entries.len() {
            warn!(
                endpoint = %self.config.batch_endpoint_url,
                parts = parts.len(),
                entries = entries.len(),
                "combined response carried more parts than requests; extras ignored"
            );
        }

        let mut parts = parts.into_iter();
        for (index, entry) in entries.into_iter().enumerate() {
            let outcome = match parts.next() {
                Some(Ok(mut response)) => {
                    response.url = Some(entry.request.url.clone());
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(Error::upstream(response))
                    }
                }
                Some(Err(error)) => {
                    warn!(
                        endpoint = %self.config.batch_endpoint_url,
                        index, %error, "failed to decode one batch part"
                    );
                    Err(error)
                }
                None => {
                    warn!(
                        endpoint = %self.config.batch_endpoint_url,
                        index, "combined response carried no part at this position"
                    );
                    Err(Error::PartDecode {
                        index,
                        message: "combined response carried no part at this position".to_string(),
                    })
                }
            };
            entry.deliver(outcome);
        }
    }
}
