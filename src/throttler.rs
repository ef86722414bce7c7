use crate::config::ThrottlerConfig;
use crate::error::ThrottlerResult;
use crate::metrics::ThrottleMetrics;
use crate::slot_pool::{saturating_add, SlotPool};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Admits callers to run an operation, with at most `slot_count` operations in flight
/// and no slot reused sooner than `slot_cooldown` after its release.
///
/// Callers that arrive while every slot is taken wait in arrival order. Clones share
/// the same slots and queue.
#[derive(Debug, Clone)]
pub struct Throttler {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ThrottlerConfig,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    pool: SlotPool,
    waiters: VecDeque<oneshot::Sender<()>>,
    in_flight: usize,
    metrics: ThrottleMetrics,
}

enum Admission {
    Granted(Instant),
    Queued(WaitTicket),
}

/// Point-in-time view of slot usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottlerStats {
    pub slot_count: usize,
    /// Slots in the pool, including ones still cooling down
    pub available: usize,
    /// Slots handed to callers and not yet released
    pub in_flight: usize,
    /// Callers queued for a slot
    pub waiting: usize,
}

impl Throttler {
    /// Create a throttler whose slots are staggered across one cooldown period
    pub fn new(config: ThrottlerConfig) -> Self {
        let config = ThrottlerConfig::new(config.slot_count, config.slot_cooldown);
        let pool = SlotPool::staggered(config.slot_count, config.slot_cooldown, Instant::now());

        tracing::debug!(
            slot_count = config.slot_count,
            slot_cooldown = ?config.slot_cooldown,
            "Created throttler"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    pool,
                    waiters: VecDeque::new(),
                    in_flight: 0,
                    metrics: ThrottleMetrics::default(),
                }),
            }),
        }
    }

    /// Create a throttler from plain numbers, with the cooldown in milliseconds.
    ///
    /// See [`ThrottlerConfig::from_raw`] for validation and clamping.
    pub fn from_raw(slot_count: f64, slot_cooldown_ms: f64) -> ThrottlerResult<Self> {
        Ok(Self::new(ThrottlerConfig::from_raw(slot_count, slot_cooldown_ms)?))
    }

    pub fn slot_count(&self) -> usize {
        self.inner.config.slot_count
    }

    pub fn slot_cooldown(&self) -> Duration {
        self.inner.config.slot_cooldown
    }

    pub fn config(&self) -> ThrottlerConfig {
        self.inner.config
    }

    /// Run `op` once a slot is granted and release the slot afterwards.
    ///
    /// The caller may be suspended until a slot frees up and its cooldown elapses. The
    /// output of `op`, including any error it returns, is passed through untouched. The
    /// slot is released on every exit path: normal completion, a panic inside `op`, or
    /// the returned future being dropped after the grant.
    ///
    /// There is no timeout. An operation that never completes holds its slot forever.
    pub async fn throttle<F, Fut>(&self, op: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _slot = self.acquire_slot().await;
        op().await
    }

    /// Snapshot of pool, in-flight and queue sizes
    pub fn stats(&self) -> ThrottlerStats {
        let state = self.inner.lock_state();
        ThrottlerStats {
            slot_count: self.inner.config.slot_count,
            available: state.pool.len(),
            in_flight: state.in_flight,
            waiting: state.waiters.iter().filter(|w| !w.is_closed()).count(),
        }
    }

    pub fn metrics(&self) -> ThrottleMetrics {
        self.inner.lock_state().metrics
    }

    async fn acquire_slot(&self) -> SlotGuard {
        let mut woken = false;

        loop {
            let admission = {
                let mut state = self.inner.lock_state();
                match state.pool.take_earliest() {
                    Some(ready_at) => {
                        state.in_flight += 1;
                        state.metrics.record_grant(ready_at > Instant::now());
                        Admission::Granted(ready_at)
                    }
                    None => {
                        let (tx, rx) = oneshot::channel();
                        if woken {
                            // Lost the freed slot to a newer caller; keep our place at the head
                            state.waiters.push_front(tx);
                        } else {
                            state.waiters.push_back(tx);
                            state.metrics.record_queued();
                        }
                        tracing::trace!(waiting = state.waiters.len(), "No free slot, queued");
                        Admission::Queued(WaitTicket {
                            rx,
                            inner: Arc::clone(&self.inner),
                            consumed: false,
                        })
                    }
                }
            };

            match admission {
                Admission::Granted(ready_at) => {
                    // Owned from here on, so a drop during the cooldown still releases it
                    let guard = SlotGuard {
                        inner: Arc::clone(&self.inner),
                    };
                    if ready_at > Instant::now() {
                        tracing::trace!(wait = ?(ready_at - Instant::now()), "Waiting for slot cooldown");
                        tokio::time::sleep_until(ready_at).await;
                    }
                    tracing::debug!("Slot granted");
                    return guard;
                }
                Admission::Queued(ticket) => {
                    ticket.wait().await;
                    woken = true;
                }
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_slot(&self) {
        let mut state = self.lock_state();
        let ready_at = saturating_add(Instant::now(), self.config.slot_cooldown);

        state.in_flight -= 1;
        state.pool.put(ready_at);
        state.metrics.record_release();
        tracing::debug!(available = state.pool.len(), "Slot released");

        Self::wake_next(&mut state);
    }

    /// Wake the longest-waiting caller that is still listening
    fn wake_next(state: &mut State) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                tracing::trace!(waiting = state.waiters.len(), "Woke next waiter");
                return;
            }
            tracing::trace!("Skipped abandoned waiter");
        }
    }
}

/// A place in the waiting queue.
///
/// If the caller goes away after being woken but before taking the freed slot, the
/// wake-up is handed to the next waiter so the slot does not sit idle.
struct WaitTicket {
    rx: oneshot::Receiver<()>,
    inner: Arc<Inner>,
    consumed: bool,
}

impl WaitTicket {
    async fn wait(mut self) {
        // Senders are only dropped after firing or from a closed receiver, so the result carries nothing
        let _ = (&mut self.rx).await;
        self.consumed = true;
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        if !self.consumed && self.rx.try_recv().is_ok() {
            tracing::trace!("Passing wake-up of abandoned waiter on");
            Inner::wake_next(&mut self.inner.lock_state());
        }
    }
}

/// A granted slot. Dropping it releases the slot and starts its cooldown.
#[derive(Debug)]
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.release_slot();
    }
}
