//! Task evaluation
//!
//! Turns the world snapshot plus a few external signals into the list of
//! candidate tasks for this tick, ordered by priority. Evaluation has no side
//! effects on the world; the only state it touches is the spatial query
//! cache's memo table.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::scheduler::priority::{PriorityKey, PriorityTable, StrategyMode};
use crate::scheduler::task::{raider_categories, scout_categories, Eligibility, Task, TaskKind, TaskTarget};
use crate::util::vec2::Vec2;
use crate::world::constants::threat::{AIRBORNE_BONUS, HIGH_THREAT_SCORE, ORDINARY_SCORE};
use crate::world::snapshot::{CategorySet, Unit, UnitTag, WorldSnapshot};
use crate::world::spatial::{Anchor, QueryKind, SpatialError, SpatialQueryCache};

/// External signals consumed alongside the snapshot
#[derive(Debug, Clone, Default)]
pub struct Signals {
    /// Strategy mode from the policy module
    pub mode: StrategyMode,
    /// Last-known hostile locations, most relevant first
    pub known_threats: Vec<Vec2>,
    /// Hostile main base, if known
    pub enemy_start: Option<Vec2>,
    /// Known hostile expansions
    pub enemy_expansions: Vec<Vec2>,
}

/// Result of threat scoring around the most threatened strongpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatAssessment {
    pub strongpoint_id: u64,
    pub score: u32,
    /// Centroid of the contributing hostile units
    pub centroid: Vec2,
    /// At least one contributor is in the high-threat category set
    pub critical: bool,
    pub contributors: SmallVec<[UnitTag; 8]>,
}

/// Threat score of a single hostile unit
pub fn unit_threat_score(unit: &Unit, high_threat: CategorySet) -> u32 {
    let base = if high_threat.contains(unit.category) {
        HIGH_THREAT_SCORE
    } else {
        ORDINARY_SCORE
    };
    if unit.airborne {
        base + AIRBORNE_BONUS
    } else {
        base
    }
}

/// Score every strongpoint and return the most threatened one
///
/// Strongpoints are visited in snapshot order and only a strictly higher
/// score replaces the current best, so ties go to the earlier strongpoint.
pub fn assess_threat(
    snapshot: &WorldSnapshot,
    cache: &mut SpatialQueryCache,
    radius: f32,
) -> Result<Option<ThreatAssessment>, SpatialError> {
    let hostiles: HashMap<UnitTag, &Unit> = snapshot
        .live_hostile()
        .filter(|u| u.category.is_combat() || u.category.is_worker())
        .map(|u| (u.tag, u))
        .collect();
    if hostiles.is_empty() {
        return Ok(None);
    }

    let high_threat = CategorySet::high_threat();
    let mut best: Option<ThreatAssessment> = None;

    for strongpoint in &snapshot.strongpoints {
        let nearby = cache.query(
            QueryKind::HostileWithin,
            Anchor::Position(strongpoint.position),
            radius,
            snapshot.tick,
        )?;

        let mut score = 0;
        let mut critical = false;
        let mut contributors: SmallVec<[UnitTag; 8]> = SmallVec::new();
        let mut positions: SmallVec<[Vec2; 8]> = SmallVec::new();

        for unit in nearby.iter().filter_map(|tag| hostiles.get(tag)) {
            score += unit_threat_score(unit, high_threat);
            critical |= high_threat.contains(unit.category);
            contributors.push(unit.tag);
            positions.push(unit.position);
        }

        if score == 0 || best.as_ref().is_some_and(|b| score <= b.score) {
            continue;
        }

        if let Some(centroid) = Vec2::centroid(positions) {
            best = Some(ThreatAssessment {
                strongpoint_id: strongpoint.id,
                score,
                centroid,
                critical,
                contributors,
            });
        }
    }

    Ok(best)
}

/// Builds the prioritized task list each tick
#[derive(Debug, Clone)]
pub struct TaskEvaluator {
    priorities: PriorityTable,
    threat_radius: f32,
    defense_pull_radius: f32,
    defenders_per_threat_point: usize,
    critical_defender_bonus: usize,
    min_army_early: usize,
    min_army_late: usize,
    late_game_secs: f32,
    denial_min_army: usize,
    denial_squad_size: usize,
    harass_squad_size: usize,
}

impl TaskEvaluator {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            priorities: config.priorities.clone(),
            threat_radius: config.threat_radius,
            defense_pull_radius: config.defense_pull_radius,
            defenders_per_threat_point: config.defenders_per_threat_point,
            critical_defender_bonus: config.critical_defender_bonus,
            min_army_early: config.min_army_early,
            min_army_late: config.min_army_late,
            late_game_secs: config.late_game_secs,
            denial_min_army: config.denial_min_army,
            denial_squad_size: config.denial_squad_size,
            harass_squad_size: config.harass_squad_size,
        }
    }

    pub fn priorities(&self) -> &PriorityTable {
        &self.priorities
    }

    /// Army size required before a main attack is generated
    fn min_army_for_attack(&self, game_time_secs: f32) -> usize {
        if game_time_secs >= self.late_game_secs {
            self.min_army_late
        } else {
            self.min_army_early
        }
    }

    /// Candidate tasks for this tick, highest priority first
    ///
    /// Never fails: a snapshot without strongpoints, or a cache that was not
    /// prepared for this tick, yields an empty list.
    pub fn evaluate(
        &self,
        snapshot: &WorldSnapshot,
        signals: &Signals,
        cache: &mut SpatialQueryCache,
    ) -> Vec<Task> {
        self.evaluate_with_threat(snapshot, signals, cache).0
    }

    /// Same as [`evaluate`](Self::evaluate), also returning the threat
    /// assessment that drove base defense
    pub fn evaluate_with_threat(
        &self,
        snapshot: &WorldSnapshot,
        signals: &Signals,
        cache: &mut SpatialQueryCache,
    ) -> (Vec<Task>, Option<ThreatAssessment>) {
        if snapshot.strongpoints.is_empty() {
            debug!("No strongpoints at tick {}, no tasks", snapshot.tick);
            return (Vec::new(), None);
        }

        match self.build_tasks(snapshot, signals, cache) {
            Ok(result) => result,
            Err(e) => {
                warn!("Task evaluation skipped at tick {}: {}", snapshot.tick, e);
                (Vec::new(), None)
            }
        }
    }

    fn build_tasks(
        &self,
        snapshot: &WorldSnapshot,
        signals: &Signals,
        cache: &mut SpatialQueryCache,
    ) -> Result<(Vec<Task>, Option<ThreatAssessment>), SpatialError> {
        let table = self.priorities.rescaled(signals.mode);
        let threat = assess_threat(snapshot, cache, self.threat_radius)?;
        let army = snapshot.army_size();
        let home = snapshot.home();
        let mut tasks = Vec::with_capacity(6);

        if let Some(threat) = &threat {
            let (key, bonus) = if threat.critical {
                info!(
                    "Critical threat at strongpoint {} (score {})",
                    threat.strongpoint_id, threat.score
                );
                (PriorityKey::DefenseCritical, self.critical_defender_bonus)
            } else {
                debug!(
                    "Threat at strongpoint {} (score {})",
                    threat.strongpoint_id, threat.score
                );
                (PriorityKey::DefenseLight, 0)
            };
            let limit = threat.score as usize * self.defenders_per_threat_point + bonus;
            tasks.push(
                Task::new(
                    TaskKind::BaseDefense,
                    TaskTarget::Position(threat.centroid),
                    table.get(key),
                )
                .eligibility(Eligibility::combat().within(self.defense_pull_radius))
                .limit(limit),
            );
        }

        if let Some(home) = home.filter(|_| army >= self.denial_min_army) {
            let closest = signals
                .enemy_expansions
                .iter()
                .copied()
                .min_by(|a, b| a.distance_sq_to(home).total_cmp(&b.distance_sq_to(home)));
            if let Some(expansion) = closest {
                tasks.push(
                    Task::new(
                        TaskKind::ExpansionDenial,
                        TaskTarget::Position(expansion),
                        table.get(PriorityKey::ExpansionDenial),
                    )
                    .limit(self.denial_squad_size),
                );
            }
        }

        let critical_active = threat.as_ref().is_some_and(|t| t.critical);
        let harass_target = signals
            .enemy_start
            .or_else(|| signals.enemy_expansions.first().copied());
        if let Some(target) = harass_target.filter(|_| !critical_active) {
            tasks.push(
                Task::new(
                    TaskKind::Harass,
                    TaskTarget::Position(target),
                    table.get(PriorityKey::Harass),
                )
                .eligibility(Eligibility::categories(raider_categories()))
                .limit(self.harass_squad_size),
            );
        }

        if army >= self.min_army_for_attack(snapshot.game_time_secs) {
            if let Some(target) = self.attack_target(snapshot, signals, cache, home)? {
                tasks.push(Task::new(
                    TaskKind::MainAttack,
                    target,
                    table.get(PriorityKey::MainAttack),
                ));
            }
        }

        let nothing_seen = snapshot.live_hostile().next().is_none() && signals.known_threats.is_empty();
        if let Some(start) = signals.enemy_start.filter(|_| nothing_seen) {
            tasks.push(
                Task::new(
                    TaskKind::Scout,
                    TaskTarget::Position(start),
                    table.get(PriorityKey::Scout),
                )
                .eligibility(Eligibility::categories(scout_categories()))
                .limit(1),
            );
        }

        if tasks.is_empty() {
            if let Some(home) = home {
                tasks.push(Task::new(
                    TaskKind::Rally,
                    TaskTarget::Position(home),
                    table.get(PriorityKey::Rally),
                ));
            }
        }

        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok((tasks, threat))
    }

    /// First known threat, else the enemy start, else the visible hostile
    /// closest to home
    fn attack_target(
        &self,
        snapshot: &WorldSnapshot,
        signals: &Signals,
        cache: &mut SpatialQueryCache,
        home: Option<Vec2>,
    ) -> Result<Option<TaskTarget>, SpatialError> {
        if let Some(threat) = signals.known_threats.first() {
            return Ok(Some(TaskTarget::Position(*threat)));
        }
        if let Some(start) = signals.enemy_start {
            return Ok(Some(TaskTarget::Position(start)));
        }
        let Some(home) = home else {
            return Ok(None);
        };
        let nearest = cache.query(
            QueryKind::NearestHostile,
            Anchor::Position(home),
            f32::INFINITY,
            snapshot.tick,
        )?;
        Ok(nearest.first().map(|tag| TaskTarget::Unit(*tag)))
    }
}

impl Default for TaskEvaluator {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}
