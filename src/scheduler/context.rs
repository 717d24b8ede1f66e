//! Per-tick orchestration
//!
//! [`SchedulerContext`] owns every per-tick component and runs the pipeline:
//! throttle gate, cache reset, evaluation, allocation, dispatch. The ledger is
//! shared out as `Arc<ResourceLedger>` to production subsystems; the context
//! only feeds it the tick's totals and sweeps stale reservations.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashSet;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::ledger::ResourceLedger;
use crate::metrics::SchedulerMetrics;
use crate::scheduler::allocator::{allocate, Allocation, UnitPool};
use crate::scheduler::commands::{CommandBuffer, CommandIntent};
use crate::scheduler::dispatch::{DispatchReport, Dispatcher};
use crate::scheduler::evaluator::{Signals, TaskEvaluator, ThreatAssessment};
use crate::scheduler::task::Task;
use crate::scheduler::throttle::ExecutionThrottle;
use crate::world::snapshot::{Tick, UnitTag, WorldSnapshot};
use crate::world::spatial::SpatialQueryCache;

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub tick: Tick,
    /// Whether the full pass ran (false = throttled)
    pub ran: bool,
    pub emergency: bool,
    pub tasks: Vec<Task>,
    pub threat: Option<ThreatAssessment>,
    pub allocation: Allocation,
    pub dispatch: DispatchReport,
    /// Owners whose stale reservations were reclaimed this tick
    pub reclaimed: Vec<String>,
}

/// Owns the decision core for one controlled player
pub struct SchedulerContext {
    evaluator: TaskEvaluator,
    cache: SpatialQueryCache,
    throttle: ExecutionThrottle,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<SchedulerMetrics>,
    dispatcher: Dispatcher,
    commands: CommandBuffer,
    /// Ticks between stale-reservation sweeps
    gc_interval: u64,
    last_gc_tick: Option<Tick>,
}

impl SchedulerContext {
    pub fn new(config: &SchedulerConfig) -> Self {
        let ledger = Arc::new(ResourceLedger::new(config.stale_reservation_ticks));
        Self::with_ledger(config, ledger)
    }

    /// Build a context around an existing shared ledger
    pub fn with_ledger(config: &SchedulerConfig, ledger: Arc<ResourceLedger>) -> Self {
        let commands = CommandBuffer::new(config.command_buffer_capacity.max(1));
        let dispatcher = Dispatcher::with_command_executors(commands.sender());

        Self {
            evaluator: TaskEvaluator::from_config(config),
            cache: SpatialQueryCache::new(config.grid_cell_size),
            throttle: ExecutionThrottle::from_config(config),
            ledger,
            metrics: Arc::new(SchedulerMetrics::new()),
            dispatcher,
            commands,
            gc_interval: u64::from(config.tick_rate.max(1)),
            last_gc_tick: None,
        }
    }

    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Register custom executors here
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn throttle(&self) -> &ExecutionThrottle {
        &self.throttle
    }

    pub fn cache(&self) -> &SpatialQueryCache {
        &self.cache
    }

    /// Take every command intent produced since the last drain
    pub fn drain_commands(&self) -> Vec<CommandIntent> {
        self.commands.drain()
    }

    /// Run one tick of the decision core
    ///
    /// `locked` holds units committed to long-running missions elsewhere; they
    /// are never assigned.
    pub fn run_tick(
        &mut self,
        snapshot: &WorldSnapshot,
        signals: &Signals,
        locked: &HashSet<UnitTag>,
    ) -> TickOutcome {
        let tick = snapshot.tick;
        self.metrics.ticks_seen.fetch_add(1, Ordering::Relaxed);

        self.ledger.set_totals(snapshot.resources, tick);
        let reclaimed = self.sweep_ledger(tick);

        let mut outcome = TickOutcome {
            tick,
            reclaimed,
            ..TickOutcome::default()
        };

        if !self.throttle.gate(snapshot, &mut self.cache) {
            self.metrics.passes_skipped.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_ledger(self.ledger.stats());
            return outcome;
        }

        let started = Instant::now();

        self.cache.begin_tick(tick, snapshot);
        let (tasks, threat) = self
            .evaluator
            .evaluate_with_threat(snapshot, signals, &mut self.cache);

        let pool = UnitPool::from_snapshot(snapshot, locked);
        let allocation = allocate(tasks.clone(), pool, snapshot);
        let report = self.dispatcher.dispatch(&allocation, snapshot);

        let elapsed = started.elapsed();
        self.throttle.record_pass(elapsed);

        debug!(
            "Tick {}: {} tasks, {} assigned, {} idle, {} dispatched in {:?}",
            tick,
            tasks.len(),
            allocation.len(),
            allocation.unassigned.len(),
            report.dispatched,
            elapsed
        );

        outcome.ran = true;
        outcome.emergency = self.throttle.is_emergency();
        self.record_pass(&tasks, &allocation, &report, elapsed, outcome.emergency);

        outcome.tasks = tasks;
        outcome.threat = threat;
        outcome.allocation = allocation;
        outcome.dispatch = report;
        outcome
    }

    /// Periodic stale-reservation sweep, once per simulated second
    fn sweep_ledger(&mut self, tick: Tick) -> Vec<String> {
        let due = match self.last_gc_tick {
            None => true,
            Some(last) => tick < last || tick - last >= self.gc_interval,
        };
        if !due {
            return Vec::new();
        }
        self.last_gc_tick = Some(tick);
        self.ledger.collect_stale(tick)
    }

    fn record_pass(
        &self,
        tasks: &[Task],
        allocation: &Allocation,
        report: &DispatchReport,
        elapsed: std::time::Duration,
        emergency: bool,
    ) {
        let m = &self.metrics;
        m.passes_run.fetch_add(1, Ordering::Relaxed);
        if emergency {
            m.emergency_passes.fetch_add(1, Ordering::Relaxed);
        }
        m.record_pass_time(elapsed);
        m.budget_status
            .store(self.throttle.budget().status().level(), Ordering::Relaxed);
        m.tasks_generated.store(tasks.len() as u64, Ordering::Relaxed);
        m.tasks_skipped
            .store(allocation.skipped.len() as u64, Ordering::Relaxed);
        m.units_assigned.store(allocation.len() as u64, Ordering::Relaxed);
        m.units_idle
            .store(allocation.unassigned.len() as u64, Ordering::Relaxed);
        m.commands_dispatched
            .fetch_add(report.dispatched as u64, Ordering::Relaxed);
        m.dispatch_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        m.record_cache(self.cache.stats());
        m.record_ledger(self.ledger.stats());
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new(&SchedulerConfig::default())
    }
}
