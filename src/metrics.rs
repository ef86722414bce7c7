use serde::{Deserialize, Serialize};

/// Cumulative admission counters for one throttler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    /// Slots handed to callers
    pub total_grants: u64,
    /// Grants that needed no waiting at all
    pub immediate_grants: u64,
    /// Grants that slept until a slot's cooldown elapsed
    pub cooldown_waits: u64,
    /// Times a caller joined the waiting queue
    pub queued_waits: u64,
    /// Slots returned to the pool
    pub releases: u64,
}

impl ThrottleMetrics {
    pub(crate) fn record_grant(&mut self, waited_for_cooldown: bool) {
        self.total_grants += 1;
        if waited_for_cooldown {
            self.cooldown_waits += 1;
        } else {
            self.immediate_grants += 1;
        }
    }

    pub(crate) fn record_queued(&mut self) {
        self.queued_waits += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_accounting() {
        let mut metrics = ThrottleMetrics::default();
        metrics.record_grant(false);
        metrics.record_grant(true);
        metrics.record_grant(true);
        metrics.record_queued();
        metrics.record_release();

        assert_eq!(metrics.total_grants, 3);
        assert_eq!(metrics.immediate_grants, 1);
        assert_eq!(metrics.cooldown_waits, 2);
        assert_eq!(metrics.queued_waits, 1);
        assert_eq!(metrics.releases, 1);
    }

    #[test]
    fn test_metrics_serialization() {
        let metrics = ThrottleMetrics {
            total_grants: 4,
            releases: 4,
            ..Default::default()
        };

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"total_grants\":4"));
        assert!(json.contains("\"releases\":4"));
    }
}
