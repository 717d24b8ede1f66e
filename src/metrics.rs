//! Prometheus-compatible scheduler metrics
//!
//! Counters are plain atomics updated from the tick loop; the transport layer
//! (or the demo driver) renders them with [`SchedulerMetrics::to_prometheus`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::ledger::LedgerStats;
use crate::world::spatial::CacheStats;

/// Metrics registry for the decision core
#[derive(Debug)]
pub struct SchedulerMetrics {
    // Throttle
    pub ticks_seen: AtomicU64,
    pub passes_run: AtomicU64,
    pub passes_skipped: AtomicU64,
    pub emergency_passes: AtomicU64,

    // Pass timing (microseconds)
    pub pass_time_us: AtomicU64,
    pub pass_time_p95_us: AtomicU64,
    pub pass_time_max_us: AtomicU64,
    // 0=Excellent, 1=Good, 2=Warning, 3=Critical
    pub budget_status: AtomicU64,

    // Evaluation and allocation (last pass)
    pub tasks_generated: AtomicU64,
    pub tasks_skipped: AtomicU64,
    pub units_assigned: AtomicU64,
    pub units_idle: AtomicU64,

    // Dispatch (totals)
    pub commands_dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,

    // Spatial cache
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    // Ledger
    pub reservations_successful: AtomicU64,
    pub reservations_failed: AtomicU64,
    pub reservations_released: AtomicU64,
    pub reservations_reclaimed: AtomicU64,
    pub reservations_active: AtomicU64,

    start_time: Instant,

    // Rolling pass times for percentile calculation
    pass_history: RwLock<VecDeque<u64>>,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            ticks_seen: AtomicU64::new(0),
            passes_run: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            emergency_passes: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
            pass_time_p95_us: AtomicU64::new(0),
            pass_time_max_us: AtomicU64::new(0),
            budget_status: AtomicU64::new(0),
            tasks_generated: AtomicU64::new(0),
            tasks_skipped: AtomicU64::new(0),
            units_assigned: AtomicU64::new(0),
            units_idle: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            reservations_successful: AtomicU64::new(0),
            reservations_failed: AtomicU64::new(0),
            reservations_released: AtomicU64::new(0),
            reservations_reclaimed: AtomicU64::new(0),
            reservations_active: AtomicU64::new(0),
            start_time: Instant::now(),
            pass_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a full pass duration and update percentiles
    pub fn record_pass_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.pass_time_us.store(us, Ordering::Relaxed);

        let mut history = self.pass_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.pass_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.pass_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_cache(&self, stats: CacheStats) {
        self.cache_hits.store(stats.hits, Ordering::Relaxed);
        self.cache_misses.store(stats.misses, Ordering::Relaxed);
    }

    pub fn record_ledger(&self, stats: LedgerStats) {
        self.reservations_successful.store(stats.successful, Ordering::Relaxed);
        self.reservations_failed.store(stats.failed, Ordering::Relaxed);
        self.reservations_released.store(stats.releases, Ordering::Relaxed);
        self.reservations_reclaimed.store(stats.gc_reclaimed, Ordering::Relaxed);
        self.reservations_active.store(stats.active as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Throttle
        metric!("hivemind_ticks_total", "Ticks seen by the scheduler", "counter",
            self.ticks_seen.load(Ordering::Relaxed));
        metric!("hivemind_passes_run_total", "Full scheduling passes run", "counter",
            self.passes_run.load(Ordering::Relaxed));
        metric!("hivemind_passes_skipped_total", "Ticks skipped by the throttle", "counter",
            self.passes_skipped.load(Ordering::Relaxed));
        metric!("hivemind_emergency_passes_total", "Passes run in emergency mode", "counter",
            self.emergency_passes.load(Ordering::Relaxed));

        // Timing
        metric!("hivemind_pass_time_microseconds", "Last full pass time in microseconds", "gauge",
            self.pass_time_us.load(Ordering::Relaxed));
        metric!("hivemind_pass_time_p95_microseconds", "95th percentile pass time", "gauge",
            self.pass_time_p95_us.load(Ordering::Relaxed));
        metric!("hivemind_pass_time_max_microseconds", "Maximum pass time", "gauge",
            self.pass_time_max_us.load(Ordering::Relaxed));
        metric!("hivemind_budget_status", "Tick budget status (0=Excellent, 3=Critical)", "gauge",
            self.budget_status.load(Ordering::Relaxed));

        let status_name = match self.budget_status.load(Ordering::Relaxed) {
            0 => "excellent",
            1 => "good",
            2 => "warning",
            _ => "critical",
        };
        output.push_str(&format!(
            "# HELP hivemind_budget_state Human-readable budget state\n# TYPE hivemind_budget_state gauge\nhivemind_budget_state{{state=\"{}\"}} 1\n",
            status_name
        ));

        // Scheduling
        metric!("hivemind_tasks", "Tasks generated by the last pass", "gauge",
            self.tasks_generated.load(Ordering::Relaxed));
        metric!("hivemind_tasks_skipped", "Tasks with no eligible unit in the last pass", "gauge",
            self.tasks_skipped.load(Ordering::Relaxed));
        metric!("hivemind_units_assigned", "Units assigned in the last pass", "gauge",
            self.units_assigned.load(Ordering::Relaxed));
        metric!("hivemind_units_idle", "Units left unassigned in the last pass", "gauge",
            self.units_idle.load(Ordering::Relaxed));
        metric!("hivemind_commands_dispatched_total", "Command intents dispatched", "counter",
            self.commands_dispatched.load(Ordering::Relaxed));
        metric!("hivemind_dispatch_failures_total", "Per-unit dispatch failures", "counter",
            self.dispatch_failures.load(Ordering::Relaxed));

        // Spatial cache
        metric!("hivemind_cache_hits_total", "Spatial cache hits", "counter",
            self.cache_hits.load(Ordering::Relaxed));
        metric!("hivemind_cache_misses_total", "Spatial cache misses", "counter",
            self.cache_misses.load(Ordering::Relaxed));

        // Ledger
        metric!("hivemind_reservations_successful_total", "Successful reservations", "counter",
            self.reservations_successful.load(Ordering::Relaxed));
        metric!("hivemind_reservations_failed_total", "Rejected reservations", "counter",
            self.reservations_failed.load(Ordering::Relaxed));
        metric!("hivemind_reservations_released_total", "Released reservations", "counter",
            self.reservations_released.load(Ordering::Relaxed));
        metric!("hivemind_reservations_reclaimed_total", "Stale reservations reclaimed", "counter",
            self.reservations_reclaimed.load(Ordering::Relaxed));
        metric!("hivemind_reservations_active", "Active reservations", "gauge",
            self.reservations_active.load(Ordering::Relaxed));

        metric!("hivemind_uptime_seconds", "Scheduler uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
