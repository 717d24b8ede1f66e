//! Frame skipping for the scheduling pass
//!
//! Under normal load the full pass runs every few ticks. While the base is in
//! danger (emergency) it runs every tick. The emergency flag itself is only
//! recomputed every `emergency_eval_interval` ticks so the mode does not
//! flap from one tick to the next.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::scheduler::performance::{BudgetMonitor, BudgetStatus};
use crate::world::snapshot::{Tick, WorldSnapshot};
use crate::world::spatial::{Anchor, QueryKind, SpatialError, SpatialQueryCache};

/// Is a full pass due?
///
/// Emergencies and the very first pass always run. A tick that went
/// backwards (new game, replay restart) also runs.
#[inline]
pub fn pass_due(tick: Tick, last_run_tick: Option<Tick>, is_emergency: bool, interval: u64) -> bool {
    if is_emergency {
        return true;
    }
    match last_run_tick {
        None => true,
        Some(last) if tick < last => true,
        Some(last) => tick - last >= interval.max(1),
    }
}

/// Emergency detection radii and thresholds
#[derive(Debug, Clone, Copy)]
struct AlertRules {
    strongpoint_radius: f32,
    engagement_population: usize,
    engagement_sample_size: usize,
    engagement_radius: f32,
    worker_radius: f32,
}

impl AlertRules {
    fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            strongpoint_radius: config.strongpoint_alert_radius,
            engagement_population: config.engagement_population,
            engagement_sample_size: config.engagement_sample_size,
            engagement_radius: config.engagement_radius,
            worker_radius: config.worker_alert_radius,
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleStats {
    pub passes_run: u64,
    pub passes_skipped: u64,
    pub emergency_passes: u64,
}

/// Stateful gate in front of the scheduling pass
pub struct ExecutionThrottle {
    interval: u64,
    emergency_eval_interval: u64,
    rules: AlertRules,
    last_run_tick: Option<Tick>,
    emergency: bool,
    last_emergency_eval: Option<Tick>,
    monitor: BudgetMonitor,
    stats: ThrottleStats,
}

impl ExecutionThrottle {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: config.throttle_interval.max(1),
            emergency_eval_interval: config.emergency_eval_interval.max(1),
            rules: AlertRules::from_config(config),
            last_run_tick: None,
            emergency: false,
            last_emergency_eval: None,
            monitor: BudgetMonitor::new(config.tick_rate),
            stats: ThrottleStats::default(),
        }
    }

    /// Normal interval stretched by the budget status
    pub fn effective_interval(&self) -> u64 {
        self.interval * self.monitor.status().interval_multiplier()
    }

    /// [`pass_due`] with the current effective interval
    pub fn should_run_full_pass(&self, tick: Tick, last_run_tick: Option<Tick>, is_emergency: bool) -> bool {
        pass_due(tick, last_run_tick, is_emergency, self.effective_interval())
    }

    /// Decide whether this tick runs the full pass, and record it if so
    ///
    /// Prepares `cache` for the snapshot when the emergency flag is due for
    /// re-evaluation; the evaluator then reuses the same grids.
    pub fn gate(&mut self, snapshot: &WorldSnapshot, cache: &mut SpatialQueryCache) -> bool {
        let tick = snapshot.tick;

        let eval_due = match self.last_emergency_eval {
            None => true,
            Some(last) => tick < last || tick - last >= self.emergency_eval_interval,
        };
        if eval_due {
            cache.begin_tick(tick, snapshot);
            let emergency = self.detect_emergency(snapshot, cache);
            if emergency != self.emergency {
                if emergency {
                    info!("Emergency mode entered at tick {}", tick);
                } else {
                    info!("Emergency mode cleared at tick {}", tick);
                }
            }
            self.emergency = emergency;
            self.last_emergency_eval = Some(tick);
        }

        let run = self.should_run_full_pass(tick, self.last_run_tick, self.emergency);
        if run {
            self.last_run_tick = Some(tick);
            self.stats.passes_run += 1;
            if self.emergency {
                self.stats.emergency_passes += 1;
            }
        } else {
            self.stats.passes_skipped += 1;
        }
        run
    }

    /// OR of the three alert conditions
    ///
    /// A spatial error means the cache could not answer for this tick; the
    /// pass runs in that case.
    pub fn detect_emergency(&self, snapshot: &WorldSnapshot, cache: &mut SpatialQueryCache) -> bool {
        match self.check_alerts(snapshot, cache) {
            Ok(emergency) => emergency,
            Err(e) => {
                warn!("Emergency check failed at tick {}: {}", snapshot.tick, e);
                true
            }
        }
    }

    fn check_alerts(&self, snapshot: &WorldSnapshot, cache: &mut SpatialQueryCache) -> Result<bool, SpatialError> {
        let tick = snapshot.tick;

        for strongpoint in &snapshot.strongpoints {
            if cache.any_hostile_within(strongpoint.position, self.rules.strongpoint_radius, tick)? {
                debug!("Hostile near strongpoint {}", strongpoint.id);
                return Ok(true);
            }
        }

        let friendly_combat = snapshot.live_friendly().filter(|u| u.category.is_combat()).count();
        let hostile_combat = snapshot.live_hostile().filter(|u| u.category.is_combat()).count();
        if friendly_combat > self.rules.engagement_population
            && hostile_combat > self.rules.engagement_population
        {
            let sample = snapshot
                .live_friendly()
                .filter(|u| u.category.is_combat())
                .take(self.rules.engagement_sample_size);
            for unit in sample {
                let nearby = cache.query(
                    QueryKind::NearestHostile,
                    Anchor::Unit(unit.tag),
                    self.rules.engagement_radius,
                    tick,
                )?;
                if !nearby.is_empty() {
                    debug!("Engagement detected around {}", unit.tag);
                    return Ok(true);
                }
            }
        }

        for worker in snapshot.live_friendly().filter(|u| u.category.is_worker()) {
            if cache.any_hostile_within(worker.position, self.rules.worker_radius, tick)? {
                debug!("Worker {} under attack", worker.tag);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Record how long the last full pass took
    pub fn record_pass(&mut self, duration: Duration) {
        let before = self.monitor.status();
        self.monitor.record(duration);
        let after = self.monitor.status();
        if before != after {
            match after {
                BudgetStatus::Warning | BudgetStatus::Critical => {
                    warn!("Tick budget {}", self.monitor.status_message())
                }
                _ => info!("Tick budget {}", self.monitor.status_message()),
            }
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn last_run_tick(&self) -> Option<Tick> {
        self.last_run_tick
    }

    pub fn budget(&self) -> &BudgetMonitor {
        &self.monitor
    }

    pub fn stats(&self) -> ThrottleStats {
        self.stats
    }
}

impl Default for ExecutionThrottle {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;
    use crate::world::snapshot::{Strongpoint, Unit, UnitCategory};

    fn quiet_snapshot(tick: Tick) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(tick);
        snapshot.strongpoints.push(Strongpoint {
            id: 1,
            position: Vec2::ZERO,
        });
        snapshot
            .friendly
            .push(Unit::new(1, UnitCategory::Infantry, Vec2::new(5.0, 0.0)));
        snapshot
            .hostile
            .push(Unit::new(100, UnitCategory::Infantry, Vec2::new(200.0, 200.0)));
        snapshot
    }

    fn run_ticks(throttle: &mut ExecutionThrottle, ticks: std::ops::Range<Tick>, make: impl Fn(Tick) -> WorldSnapshot) -> Vec<Tick> {
        let mut cache = SpatialQueryCache::default();
        ticks
            .filter(|tick| throttle.gate(&make(*tick), &mut cache))
            .collect()
    }

    #[test]
    fn test_pass_due() {
        assert!(pass_due(0, None, false, 4));
        assert!(!pass_due(5, Some(3), false, 4));
        assert!(pass_due(7, Some(3), false, 4));
        assert!(pass_due(4, Some(3), true, 4));
        // tick went backwards
        assert!(pass_due(1, Some(100), false, 4));
    }

    #[test]
    fn test_normal_load_skips_frames() {
        let mut throttle = ExecutionThrottle::default();
        let ran = run_ticks(&mut throttle, 0..13, quiet_snapshot);

        assert_eq!(ran, vec![0, 4, 8, 12]);
        assert!(!throttle.is_emergency());
        assert_eq!(throttle.stats().passes_skipped, 9);
    }

    #[test]
    fn test_hostile_near_strongpoint_runs_every_tick() {
        let mut throttle = ExecutionThrottle::default();
        let ran = run_ticks(&mut throttle, 0..6, |tick| {
            let mut snapshot = quiet_snapshot(tick);
            snapshot
                .hostile
                .push(Unit::new(101, UnitCategory::Light, Vec2::new(10.0, 0.0)));
            snapshot
        });

        assert_eq!(ran, vec![0, 1, 2, 3, 4, 5]);
        assert!(throttle.is_emergency());
        assert_eq!(throttle.stats().emergency_passes, 6);
    }

    #[test]
    fn test_emergency_flag_only_reevaluated_on_interval() {
        let mut throttle = ExecutionThrottle::default();
        let mut cache = SpatialQueryCache::default();

        let danger = |tick| {
            let mut snapshot = quiet_snapshot(tick);
            snapshot
                .hostile
                .push(Unit::new(101, UnitCategory::Light, Vec2::new(10.0, 0.0)));
            snapshot
        };

        // Evaluated at tick 0: emergency
        assert!(throttle.gate(&danger(0), &mut cache));
        // Threat gone at tick 1 and 2, but the flag is still cached
        assert!(throttle.gate(&quiet_snapshot(1), &mut cache));
        assert!(throttle.gate(&quiet_snapshot(2), &mut cache));
        assert!(throttle.is_emergency());
        // Re-evaluated at tick 3
        assert!(!throttle.gate(&quiet_snapshot(3), &mut cache));
        assert!(!throttle.is_emergency());
    }

    #[test]
    fn test_worker_alert() {
        let throttle = ExecutionThrottle::default();
        let mut cache = SpatialQueryCache::default();
        let mut snapshot = quiet_snapshot(1);
        snapshot
            .friendly
            .push(Unit::new(2, UnitCategory::Worker, Vec2::new(80.0, 80.0)));
        snapshot
            .hostile
            .push(Unit::new(101, UnitCategory::Light, Vec2::new(85.0, 80.0)));
        cache.begin_tick(1, &snapshot);

        assert!(throttle.detect_emergency(&snapshot, &mut cache));
    }

    #[test]
    fn test_engagement_requires_large_populations() {
        let throttle = ExecutionThrottle::default();
        let mut cache = SpatialQueryCache::default();

        // 9 vs 9 combat units brushing against each other far from home
        let mut snapshot = WorldSnapshot::new(1);
        snapshot.strongpoints.push(Strongpoint {
            id: 1,
            position: Vec2::ZERO,
        });
        for i in 0..9 {
            let x = 300.0 + i as f32;
            snapshot
                .friendly
                .push(Unit::new(i + 1, UnitCategory::Infantry, Vec2::new(x, 300.0)));
            snapshot
                .hostile
                .push(Unit::new(i + 100, UnitCategory::Infantry, Vec2::new(x, 305.0)));
        }
        cache.begin_tick(1, &snapshot);
        assert!(throttle.detect_emergency(&snapshot, &mut cache));

        // Same skirmish with only 8 hostiles is below the population threshold
        snapshot.hostile.truncate(8);
        snapshot.tick = 2;
        cache.begin_tick(2, &snapshot);
        assert!(!throttle.detect_emergency(&snapshot, &mut cache));
    }

    #[test]
    fn test_unprepared_cache_counts_as_emergency() {
        let throttle = ExecutionThrottle::default();
        let mut cache = SpatialQueryCache::default();
        assert!(throttle.detect_emergency(&quiet_snapshot(9), &mut cache));
    }

    #[test]
    fn test_over_budget_stretches_interval() {
        let config = SchedulerConfig {
            tick_rate: 20,
            ..SchedulerConfig::default()
        };
        let mut throttle = ExecutionThrottle::from_config(&config);
        assert_eq!(throttle.effective_interval(), 4);

        for _ in 0..20 {
            throttle.record_pass(Duration::from_millis(40));
        }
        assert_eq!(throttle.effective_interval(), 8);

        for _ in 0..100 {
            throttle.record_pass(Duration::from_millis(80));
        }
        assert_eq!(throttle.effective_interval(), 12);
        // emergencies ignore the stretched interval
        assert!(throttle.should_run_full_pass(13, Some(12), true));
    }
}
