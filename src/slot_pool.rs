use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Available slots, each represented only by the instant it may next be granted.
///
/// Entries are kept in ascending order. Releases always append `now + cooldown` with a
/// constant cooldown, so appending preserves the order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlotPool {
    ready_at: VecDeque<Instant>,
}

impl SlotPool {
    /// Seed `slot_count` slots staggered evenly across one cooldown period.
    ///
    /// Slot `i` of `n` becomes available at `start + i * cooldown / n`, so a saturated
    /// throttler settles into a steady cadence instead of bursting every slot at once.
    pub(crate) fn staggered(slot_count: usize, cooldown: Duration, start: Instant) -> Self {
        let ready_at = (0..slot_count)
            .map(|i| {
                let ratio = i as f64 / slot_count as f64;
                let offset = Duration::try_from_secs_f64(cooldown.as_secs_f64() * ratio)
                    .unwrap_or(Duration::MAX);
                saturating_add(start, offset)
            })
            .collect();

        Self { ready_at }
    }

    /// Remove the earliest-available slot
    pub(crate) fn take_earliest(&mut self) -> Option<Instant> {
        self.ready_at.pop_front()
    }

    /// Return a slot that becomes available at `ready_at`
    pub(crate) fn put(&mut self, ready_at: Instant) {
        debug_assert!(self.ready_at.back().map_or(true, |last| *last <= ready_at));
        self.ready_at.push_back(ready_at);
    }

    pub(crate) fn len(&self) -> usize {
        self.ready_at.len()
    }
}

/// `instant + duration`, shortening `duration` until the sum fits in an `Instant`
pub(crate) fn saturating_add(instant: Instant, mut duration: Duration) -> Instant {
    loop {
        if let Some(later) = instant.checked_add(duration) {
            return later;
        }
        duration /= 2;
    }
}
