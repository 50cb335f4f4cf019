//! Cumulative counters for one hook.

/// Counters updated by [`FixDLExt`](crate::FixDLExt) as it refreshes and
/// hands out samplers.
///
/// All counts are cumulative since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeMetrics {
    /// Successful refreshes (tag map rebuilt, views re-bound).
    pub refreshes: u64,
    /// Transitions from `Armed` into `Stale`.
    pub stale_transitions: u64,
    /// Zero-copy samplers issued.
    pub borrow_samplers: u64,
    /// Copy samplers issued.
    pub copy_samplers: u64,
    /// Bytes packed into copy samplers.
    pub bytes_copied: u64,
    /// Sampling requests that returned an error.
    pub rejected_requests: u64,
    /// Callback invocations.
    pub callbacks: u64,
}

impl ExchangeMetrics {
    /// Samplers issued in either mode.
    pub fn samplers_issued(&self) -> u64 {
        self.borrow_samplers + self.copy_samplers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = ExchangeMetrics::default();
        assert_eq!(m.refreshes, 0);
        assert_eq!(m.stale_transitions, 0);
        assert_eq!(m.samplers_issued(), 0);
        assert_eq!(m.bytes_copied, 0);
        assert_eq!(m.rejected_requests, 0);
        assert_eq!(m.callbacks, 0);
    }
}
