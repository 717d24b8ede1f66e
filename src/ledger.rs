//! Thread-safe reservation ledger for the two shared currencies
//!
//! Independent subsystems claim minerals and gas before spending them. Every
//! operation is a short critical section over a single
//! `parking_lot::Mutex<LedgerState>`: no I/O and no await points are held
//! across the lock, so callers may be OS threads or async tasks alike.
//!
//! Invariant: after every successful [`ResourceLedger::try_reserve`], the sum
//! of all active reservations fits within the current totals, per currency.

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::world::constants::ledger::STALE_RESERVATION_TICKS;
use crate::world::snapshot::{ResourceTotals, Tick};

/// A named claim against shared currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub owner: String,
    pub minerals: u32,
    pub gas: u32,
    pub created_at: Tick,
}

/// Read-only ledger counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub successful: u64,
    pub failed: u64,
    pub releases: u64,
    pub gc_reclaimed: u64,
    pub active: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    totals: ResourceTotals,
    /// Latest tick seen; stamps new reservations
    clock: Tick,
    reservations: HashMap<String, Reservation>,
}

impl LedgerState {
    /// Sum of reservations, optionally skipping one owner
    fn reserved_excluding(&self, owner: Option<&str>) -> (u64, u64) {
        self.reservations
            .values()
            .filter(|r| Some(r.owner.as_str()) != owner)
            .fold((0u64, 0u64), |(m, g), r| (m + r.minerals as u64, g + r.gas as u64))
    }

    /// Move the clock to `tick`
    ///
    /// A tick behind the clock means the host restarted or is replaying:
    /// the clock follows it back and every live reservation is restamped so
    /// its age keeps counting from the new timeline.
    fn advance_clock(&mut self, tick: Tick) {
        if tick >= self.clock {
            self.clock = tick;
            return;
        }
        debug!(
            "Ledger clock rewound from {} to {}, restamping {} reservations",
            self.clock,
            tick,
            self.reservations.len()
        );
        self.clock = tick;
        for reservation in self.reservations.values_mut() {
            reservation.created_at = reservation.created_at.min(tick);
        }
    }

    fn available_excluding(&self, owner: Option<&str>) -> (u32, u32) {
        let (m, g) = self.reserved_excluding(owner);
        (
            (self.totals.minerals as u64).saturating_sub(m) as u32,
            (self.totals.gas as u64).saturating_sub(g) as u32,
        )
    }
}

/// Atomic reservation bookkeeping across named requesters
#[derive(Debug)]
pub struct ResourceLedger {
    state: Mutex<LedgerState>,
    /// Reservations older than this many ticks are reclaimed by the GC sweep
    stale_timeout: u64,
    successful: AtomicU64,
    failed: AtomicU64,
    releases: AtomicU64,
    gc_reclaimed: AtomicU64,
}

impl ResourceLedger {
    pub fn new(stale_timeout: u64) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            stale_timeout,
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            gc_reclaimed: AtomicU64::new(0),
        }
    }

    /// Create a ledger with initial totals
    pub fn with_totals(totals: ResourceTotals, stale_timeout: u64) -> Self {
        let ledger = Self::new(stale_timeout);
        ledger.state.lock().totals = totals;
        ledger
    }

    /// Feed the current totals from the tick's snapshot and advance the clock
    pub fn set_totals(&self, totals: ResourceTotals, tick: Tick) {
        let mut state = self.state.lock();
        state.totals = totals;
        state.advance_clock(tick);
    }

    pub fn totals(&self) -> ResourceTotals {
        self.state.lock().totals
    }

    /// Try to claim `minerals` and `gas` for `owner`
    ///
    /// The owner's previous reservation (if any) is not counted against
    /// availability and is replaced on success, never added to. On failure
    /// nothing changes.
    pub fn try_reserve(&self, minerals: u32, gas: u32, owner: &str) -> bool {
        let granted = {
            let mut state = self.state.lock();
            let (avail_minerals, avail_gas) = state.available_excluding(Some(owner));

            if avail_minerals >= minerals && avail_gas >= gas {
                let created_at = state.clock;
                state.reservations.insert(
                    owner.to_string(),
                    Reservation {
                        owner: owner.to_string(),
                        minerals,
                        gas,
                        created_at,
                    },
                );
                true
            } else {
                false
            }
        };

        if granted {
            self.successful.fetch_add(1, Ordering::Relaxed);
            debug!("Reserved {}m/{}g for {}", minerals, gas, owner);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            debug!("Reservation of {}m/{}g for {} denied", minerals, gas, owner);
        }
        granted
    }

    /// Like [`try_reserve`](Self::try_reserve), but the reservation is released
    /// when the returned guard is dropped unless [`ReservationGuard::keep`] is
    /// called first
    pub fn try_reserve_guard(
        self: &Arc<Self>,
        minerals: u32,
        gas: u32,
        owner: &str,
    ) -> Option<ReservationGuard> {
        if self.try_reserve(minerals, gas, owner) {
            Some(ReservationGuard {
                ledger: Arc::clone(self),
                owner: owner.to_string(),
                armed: true,
            })
        } else {
            None
        }
    }

    /// Remove the owner's reservation; no-op if absent
    ///
    /// Returns true if a reservation was removed.
    pub fn release(&self, owner: &str) -> bool {
        let removed = self.state.lock().reservations.remove(owner).is_some();
        if removed {
            self.releases.fetch_add(1, Ordering::Relaxed);
            debug!("Released reservation for {}", owner);
        }
        removed
    }

    /// Reduce the owner's reservation, flooring each currency at zero
    ///
    /// A reservation reduced to zero in both currencies is removed. Returns
    /// true if the owner had a reservation.
    pub fn release_partial(&self, owner: &str, minerals: u32, gas: u32) -> bool {
        let found = {
            let mut state = self.state.lock();
            match state.reservations.get_mut(owner) {
                Some(reservation) => {
                    reservation.minerals = reservation.minerals.saturating_sub(minerals);
                    reservation.gas = reservation.gas.saturating_sub(gas);
                    if reservation.minerals == 0 && reservation.gas == 0 {
                        state.reservations.remove(owner);
                    }
                    true
                }
                None => false,
            }
        };

        if found {
            self.releases.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Totals minus all current reservations, never negative
    pub fn available(&self) -> (u32, u32) {
        self.state.lock().available_excluding(None)
    }

    /// Sum of all active reservations
    pub fn reserved(&self) -> (u64, u64) {
        self.state.lock().reserved_excluding(None)
    }

    pub fn reservation(&self, owner: &str) -> Option<Reservation> {
        self.state.lock().reservations.get(owner).cloned()
    }

    /// Force-release reservations older than the stale timeout
    ///
    /// A stale reservation means a caller forgot to release; each one is
    /// logged as a warning. Returns the owners that were reclaimed.
    pub fn collect_stale(&self, now: Tick) -> Vec<String> {
        let mut reclaimed = Vec::new();
        {
            let mut state = self.state.lock();
            state.advance_clock(now);
            let timeout = self.stale_timeout;
            state.reservations.retain(|owner, r| {
                let stale = now.saturating_sub(r.created_at) > timeout;
                if stale {
                    reclaimed.push(owner.clone());
                }
                !stale
            });
        }

        for owner in &reclaimed {
            warn!(
                "Reclaimed stale reservation for {} (older than {} ticks)",
                owner, self.stale_timeout
            );
        }
        reclaimed.sort();
        self.gc_reclaimed
            .fetch_add(reclaimed.len() as u64, Ordering::Relaxed);
        reclaimed
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            gc_reclaimed: self.gc_reclaimed.load(Ordering::Relaxed),
            active: self.state.lock().reservations.len(),
        }
    }
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new(STALE_RESERVATION_TICKS)
    }
}

/// Releases its reservation on drop unless kept
#[derive(Debug)]
pub struct ReservationGuard {
    ledger: Arc<ResourceLedger>,
    owner: String,
    armed: bool,
}

impl ReservationGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Keep the reservation alive past the guard; the caller now owns release
    pub fn keep(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.owner)
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.release(&self.owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Barrier;

    fn ledger(minerals: u32, gas: u32) -> ResourceLedger {
        ResourceLedger::with_totals(ResourceTotals::new(minerals, gas), 100)
    }

    #[test]
    fn test_reserve_within_totals() {
        let ledger = ledger(500, 200);
        assert!(ledger.try_reserve(300, 100, "barracks"));
        assert_eq!(ledger.available(), (200, 100));
        assert!(ledger.try_reserve(200, 100, "factory"));
        assert_eq!(ledger.available(), (0, 0));
    }

    #[test]
    fn test_failed_reserve_leaves_state_unchanged() {
        let ledger = ledger(500, 200);
        assert!(ledger.try_reserve(300, 100, "barracks"));
        assert!(!ledger.try_reserve(100, 150, "factory"));
        assert_eq!(ledger.available(), (200, 100));
        assert!(ledger.reservation("factory").is_none());
        assert_eq!(ledger.stats().failed, 1);
    }

    #[test]
    fn test_reserve_replaces_prior_reservation() {
        let ledger = ledger(500, 0);
        assert!(ledger.try_reserve(100, 0, "A"));
        assert!(ledger.try_reserve(150, 0, "A"));

        let reservation = ledger.reservation("A").unwrap();
        assert_eq!(reservation.minerals, 150);
        assert_eq!(ledger.stats().active, 1);
        assert_eq!(ledger.reserved(), (150, 0));
    }

    #[test]
    fn test_replace_does_not_count_own_prior_claim() {
        let ledger = ledger(500, 0);
        assert!(ledger.try_reserve(400, 0, "A"));
        // 500 only fits if A's own 400 is excluded from the check
        assert!(ledger.try_reserve(500, 0, "A"));
        assert_eq!(ledger.available(), (0, 0));
    }

    #[test]
    fn test_failed_replace_keeps_prior_reservation() {
        let ledger = ledger(500, 0);
        assert!(ledger.try_reserve(100, 0, "A"));
        assert!(!ledger.try_reserve(600, 0, "A"));
        assert_eq!(ledger.reservation("A").unwrap().minerals, 100);
    }

    #[test]
    fn test_release_is_idempotent() {
        let ledger = ledger(500, 0);
        assert!(ledger.try_reserve(100, 0, "A"));
        assert!(ledger.release("A"));
        assert!(!ledger.release("A"));
        assert_eq!(ledger.available(), (500, 0));
        assert_eq!(ledger.stats().releases, 1);
    }

    #[test]
    fn test_release_partial() {
        let ledger = ledger(500, 300);
        assert!(ledger.try_reserve(200, 100, "A"));

        assert!(ledger.release_partial("A", 50, 200));
        let reservation = ledger.reservation("A").unwrap();
        assert_eq!((reservation.minerals, reservation.gas), (150, 0));

        assert!(ledger.release_partial("A", 150, 0));
        assert!(ledger.reservation("A").is_none());
        assert!(!ledger.release_partial("A", 1, 1));
    }

    #[test]
    fn test_available_never_negative_when_totals_drop() {
        let ledger = ledger(500, 100);
        assert!(ledger.try_reserve(400, 100, "A"));
        ledger.set_totals(ResourceTotals::new(100, 0), 5);
        assert_eq!(ledger.available(), (0, 0));
        assert!(!ledger.try_reserve(1, 0, "B"));
    }

    #[test]
    fn test_stale_reservations_are_collected() {
        let ledger = ResourceLedger::with_totals(ResourceTotals::new(1000, 0), 50);
        ledger.set_totals(ResourceTotals::new(1000, 0), 10);
        assert!(ledger.try_reserve(100, 0, "forgetful"));
        ledger.set_totals(ResourceTotals::new(1000, 0), 40);
        assert!(ledger.try_reserve(100, 0, "recent"));

        assert!(ledger.collect_stale(60).is_empty());
        let reclaimed = ledger.collect_stale(61);
        assert_eq!(reclaimed, vec!["forgetful".to_string()]);
        assert!(ledger.reservation("recent").is_some());

        let stats = ledger.stats();
        assert_eq!(stats.gc_reclaimed, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_replacement_restamps_creation_tick() {
        let ledger = ResourceLedger::with_totals(ResourceTotals::new(1000, 0), 50);
        assert!(ledger.try_reserve(100, 0, "A"));
        ledger.set_totals(ResourceTotals::new(1000, 0), 45);
        assert!(ledger.try_reserve(120, 0, "A"));
        assert_eq!(ledger.reservation("A").unwrap().created_at, 45);
        assert!(ledger.collect_stale(60).is_empty());
    }

    #[test]
    fn test_rewound_clock_still_reclaims() {
        let ledger = ResourceLedger::with_totals(ResourceTotals::new(1000, 0), 50);
        ledger.set_totals(ResourceTotals::new(1000, 0), 10_000);
        assert!(ledger.try_reserve(100, 0, "before_restart"));

        ledger.set_totals(ResourceTotals::new(1000, 0), 0);
        assert_eq!(ledger.reservation("before_restart").unwrap().created_at, 0);
        assert!(ledger.try_reserve(100, 0, "forgetful"));
        assert_eq!(ledger.reservation("forgetful").unwrap().created_at, 0);

        assert!(ledger.collect_stale(50).is_empty());
        let reclaimed = ledger.collect_stale(500);
        assert_eq!(
            reclaimed,
            vec!["before_restart".to_string(), "forgetful".to_string()]
        );
        assert_eq!(ledger.stats().active, 0);
    }

    #[test]
    fn test_stats() {
        let ledger = ledger(100, 0);
        assert!(ledger.try_reserve(50, 0, "A"));
        assert!(!ledger.try_reserve(60, 0, "B"));
        assert!(ledger.release("A"));

        assert_eq!(
            ledger.stats(),
            LedgerStats {
                successful: 1,
                failed: 1,
                releases: 1,
                gc_reclaimed: 0,
                active: 0,
            }
        );
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let ledger = Arc::new(ledger(500, 0));
        {
            let guard = ledger.try_reserve_guard(300, 0, "expansion").unwrap();
            assert_eq!(guard.owner(), "expansion");
            assert_eq!(ledger.available(), (200, 0));
        }
        assert_eq!(ledger.available(), (500, 0));
    }

    #[test]
    fn test_guard_keep_retains_reservation() {
        let ledger = Arc::new(ledger(500, 0));
        let owner = ledger.try_reserve_guard(300, 0, "expansion").unwrap().keep();
        assert_eq!(owner, "expansion");
        assert_eq!(ledger.available(), (200, 0));
        assert!(ledger.try_reserve_guard(300, 0, "other").is_none());
    }

    #[test]
    fn test_concurrent_threads_exactly_one_wins() {
        for _ in 0..50 {
            let ledger = Arc::new(ledger(500, 0));
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = ["A", "B"]
                .into_iter()
                .map(|owner| {
                    let ledger = Arc::clone(&ledger);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        ledger.try_reserve(300, 0, owner)
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|granted| *granted)
                .count();

            assert_eq!(wins, 1);
            assert!(ledger.reserved().0 <= 500);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_tasks_exactly_one_wins() {
        let ledger = Arc::new(ledger(500, 0));

        let a = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                ledger.try_reserve(300, 0, "A")
            })
        };
        let b = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                ledger.try_reserve(300, 0, "B")
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one reservation must win");
        assert!(ledger.reserved().0 <= 500);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32, u32, usize),
        Release(usize),
        Partial(usize, u32, u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..400, 0u32..200, 0usize..4).prop_map(|(m, g, o)| Op::Reserve(m, g, o)),
            (0usize..4).prop_map(Op::Release),
            (0usize..4, 0u32..200, 0u32..100).prop_map(|(o, m, g)| Op::Partial(o, m, g)),
        ]
    }

    proptest! {
        #[test]
        fn prop_reservations_never_exceed_totals(ops in proptest::collection::vec(op_strategy(), 1..64)) {
            let owners = ["A", "B", "C", "D"];
            let ledger = ledger(600, 250);

            for op in ops {
                match op {
                    Op::Reserve(m, g, o) => {
                        let before = ledger.reservation(owners[o]);
                        let granted = ledger.try_reserve(m, g, owners[o]);
                        if granted {
                            let r = ledger.reservation(owners[o]).unwrap();
                            prop_assert_eq!((r.minerals, r.gas), (m, g));
                        } else {
                            prop_assert_eq!(ledger.reservation(owners[o]), before);
                        }
                    }
                    Op::Release(o) => {
                        ledger.release(owners[o]);
                        prop_assert!(ledger.reservation(owners[o]).is_none());
                    }
                    Op::Partial(o, m, g) => {
                        ledger.release_partial(owners[o], m, g);
                    }
                }

                let (m, g) = ledger.reserved();
                prop_assert!(m <= 600);
                prop_assert!(g <= 250);
                let (am, ag) = ledger.available();
                prop_assert_eq!(am as u64 + m, 600);
                prop_assert_eq!(ag as u64 + g, 250);
            }
        }
    }
}
