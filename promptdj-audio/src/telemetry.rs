//! Scheduling telemetry: how far ahead of the audio clock buffers land.
//!
//! Lead times go into a fixed-size ring so recording never allocates. The
//! engine takes a summary periodically and logs it.

use std::time::Duration;

/// Ring buffer size for lead-time samples.
const LEAD_BUFFER_SIZE: usize = 128;

/// Lead-time and underrun counters for the scheduler.
pub struct ScheduleTelemetry {
    /// Lead times in milliseconds
    leads_ms: [u32; LEAD_BUFFER_SIZE],
    lead_idx: usize,
    /// Samples collected, saturating at LEAD_BUFFER_SIZE
    sample_count: usize,
    /// Smallest lead seen in the current window
    min_lead_ms: u32,
    /// Cumulative
    underruns: u64,
}

/// Snapshot returned by `take_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleSummary {
    pub avg_lead_ms: u32,
    pub min_lead_ms: u32,
    pub underruns: u64,
}

impl Default for ScheduleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleTelemetry {
    pub fn new() -> Self {
        Self {
            leads_ms: [0; LEAD_BUFFER_SIZE],
            lead_idx: 0,
            sample_count: 0,
            min_lead_ms: u32::MAX,
            underruns: 0,
        }
    }

    /// Record the lead of a buffer that was just scheduled.
    #[inline]
    pub fn record_lead(&mut self, lead: Duration) {
        let ms = lead.as_millis().min(u32::MAX as u128) as u32;

        self.leads_ms[self.lead_idx] = ms;
        self.lead_idx = (self.lead_idx + 1) % LEAD_BUFFER_SIZE;
        if self.sample_count < LEAD_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.min_lead_ms = self.min_lead_ms.min(ms);
    }

    #[inline]
    pub fn record_underrun(&mut self) {
        self.underruns += 1;
    }

    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }

    /// Summarize and start a fresh window. Underruns stay cumulative.
    pub fn take_summary(&mut self) -> ScheduleSummary {
        if self.sample_count == 0 {
            return ScheduleSummary {
                underruns: self.underruns,
                ..Default::default()
            };
        }

        let sum: u64 = self.leads_ms[..self.sample_count]
            .iter()
            .map(|&x| x as u64)
            .sum();
        let summary = ScheduleSummary {
            avg_lead_ms: (sum / self.sample_count as u64) as u32,
            min_lead_ms: if self.min_lead_ms == u32::MAX { 0 } else { self.min_lead_ms },
            underruns: self.underruns,
        };

        self.lead_idx = 0;
        self.sample_count = 0;
        self.min_lead_ms = u32::MAX;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_averages_leads() {
        let mut t = ScheduleTelemetry::new();
        t.record_lead(Duration::from_millis(2000));
        t.record_lead(Duration::from_millis(1500));
        t.record_lead(Duration::from_millis(1000));

        let s = t.take_summary();
        assert_eq!(s.avg_lead_ms, 1500);
        assert_eq!(s.min_lead_ms, 1000);
        assert_eq!(s.underruns, 0);
    }

    #[test]
    fn underruns_are_cumulative_across_windows() {
        let mut t = ScheduleTelemetry::new();
        t.record_underrun();
        t.record_lead(Duration::from_millis(10));
        assert_eq!(t.take_summary().underruns, 1);

        t.record_underrun();
        let s = t.take_summary();
        assert_eq!(s.underruns, 2);
        assert_eq!(s.min_lead_ms, 0);
    }

    #[test]
    fn each_summary_covers_only_its_own_window() {
        let mut t = ScheduleTelemetry::new();
        t.record_lead(Duration::from_millis(2000));
        assert!(t.has_samples());
        assert_eq!(t.take_summary().avg_lead_ms, 2000);
        assert!(!t.has_samples());

        t.record_lead(Duration::from_millis(500));
        let s = t.take_summary();
        assert_eq!(s.avg_lead_ms, 500);
        assert_eq!(s.min_lead_ms, 500);
    }
}
