//! Tick budget monitoring
//!
//! Tracks how long full scheduling passes take compared to the per-tick
//! budget (`1 / tick_rate`) and tells the throttle how far to stretch the
//! normal evaluation interval.

use std::collections::VecDeque;
use std::time::Duration;

/// Minimum samples before the status moves off `Excellent`
const MIN_SAMPLES: usize = 10;

/// Budget status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// Well under budget
    Excellent,
    /// Normal operation
    Good,
    /// Passes eat most of the tick, evaluate half as often
    Warning,
    /// At or over budget, evaluate a third as often
    Critical,
}

impl BudgetStatus {
    /// Factor applied to the normal throttle interval
    pub fn interval_multiplier(&self) -> u64 {
        match self {
            BudgetStatus::Excellent | BudgetStatus::Good => 1,
            BudgetStatus::Warning => 2,
            BudgetStatus::Critical => 3,
        }
    }

    /// Numeric level for metrics (0=Excellent .. 3=Critical)
    pub fn level(&self) -> u64 {
        match self {
            BudgetStatus::Excellent => 0,
            BudgetStatus::Good => 1,
            BudgetStatus::Warning => 2,
            BudgetStatus::Critical => 3,
        }
    }
}

/// Rolling monitor of full-pass durations
pub struct BudgetMonitor {
    durations: VecDeque<Duration>,
    max_samples: usize,
    budget: Duration,
    /// Below this fraction of budget = excellent
    excellent_threshold: f32,
    /// Above this fraction of budget = warning
    warning_threshold: f32,
    /// Above this fraction of budget = critical
    critical_threshold: f32,
    status: BudgetStatus,
}

impl BudgetMonitor {
    pub fn new(tick_rate: u32) -> Self {
        let budget = Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32);

        Self {
            durations: VecDeque::with_capacity(66), // ~3 seconds at 22Hz
            max_samples: 66,
            budget,
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 1.0,
            status: BudgetStatus::Excellent,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > self.max_samples {
            self.durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        if self.durations.len() < MIN_SAMPLES {
            return;
        }

        let ratio = self.average().as_secs_f32() / self.budget.as_secs_f32();

        self.status = if ratio < self.excellent_threshold {
            BudgetStatus::Excellent
        } else if ratio < self.warning_threshold {
            BudgetStatus::Good
        } else if ratio < self.critical_threshold {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Critical
        };
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.durations.iter().sum();
        sum / self.durations.len() as u32
    }

    /// 95th percentile pass duration
    pub fn p95(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> BudgetStatus {
        self.status
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Average pass time as percentage of the budget (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        (self.average().as_secs_f32() / self.budget.as_secs_f32()) * 100.0
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, p95 {:?}",
            self.status,
            self.budget_usage_percent(),
            self.p95()
        )
    }
}

impl Default for BudgetMonitor {
    fn default() -> Self {
        Self::new(crate::world::constants::timing::TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 20 Hz keeps the arithmetic readable: budget = 50ms
    fn fill(monitor: &mut BudgetMonitor, millis: u64) {
        for _ in 0..20 {
            monitor.record(Duration::from_millis(millis));
        }
    }

    #[test]
    fn test_starts_excellent() {
        let monitor = BudgetMonitor::new(20);
        assert_eq!(monitor.status(), BudgetStatus::Excellent);
        assert_eq!(monitor.budget(), Duration::from_millis(50));
    }

    #[test]
    fn test_needs_minimum_samples() {
        let mut monitor = BudgetMonitor::new(20);
        for _ in 0..MIN_SAMPLES - 1 {
            monitor.record(Duration::from_millis(100));
        }
        assert_eq!(monitor.status(), BudgetStatus::Excellent);
        monitor.record(Duration::from_millis(100));
        assert_eq!(monitor.status(), BudgetStatus::Critical);
    }

    #[test]
    fn test_status_levels() {
        let mut monitor = BudgetMonitor::new(20);
        fill(&mut monitor, 5);
        assert_eq!(monitor.status(), BudgetStatus::Excellent);

        let mut monitor = BudgetMonitor::new(20);
        fill(&mut monitor, 25);
        assert_eq!(monitor.status(), BudgetStatus::Good);

        let mut monitor = BudgetMonitor::new(20);
        fill(&mut monitor, 40);
        assert_eq!(monitor.status(), BudgetStatus::Warning);
        assert_eq!(monitor.status().interval_multiplier(), 2);

        let mut monitor = BudgetMonitor::new(20);
        fill(&mut monitor, 60);
        assert_eq!(monitor.status(), BudgetStatus::Critical);
        assert_eq!(monitor.status().interval_multiplier(), 3);
    }

    #[test]
    fn test_recovers_when_passes_get_cheap() {
        let mut monitor = BudgetMonitor::new(20);
        fill(&mut monitor, 60);
        assert_eq!(monitor.status(), BudgetStatus::Critical);

        for _ in 0..200 {
            monitor.record(Duration::from_millis(1));
        }
        assert_eq!(monitor.status(), BudgetStatus::Excellent);
    }
}
