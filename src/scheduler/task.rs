//! Task value objects
//!
//! Tasks are rebuilt from scratch every tick. Only [`TaskKind`] is stable
//! across ticks, which lets outside subsystems key continuity (for example a
//! lock-set of units on a harass run) by task name.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::vec2::Vec2;
use crate::world::snapshot::{CategorySet, Unit, UnitCategory, UnitTag, WorldSnapshot};

/// Stable task name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    BaseDefense,
    ExpansionDenial,
    MainAttack,
    Harass,
    Scout,
    Rally,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::BaseDefense => "base_defense",
            TaskKind::ExpansionDenial => "expansion_denial",
            TaskKind::MainAttack => "main_attack",
            TaskKind::Harass => "harass",
            TaskKind::Scout => "scout",
            TaskKind::Rally => "rally",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TaskTarget {
    Position(Vec2),
    Unit(UnitTag),
    None,
}

impl TaskTarget {
    /// Resolve to a map position using the snapshot (either side)
    pub fn resolve(&self, snapshot: &WorldSnapshot) -> Option<Vec2> {
        match self {
            TaskTarget::Position(p) => Some(*p),
            TaskTarget::Unit(tag) => snapshot.any_unit(*tag).map(|u| u.position),
            TaskTarget::None => None,
        }
    }
}

/// Which units a task accepts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub categories: CategorySet,
    /// Maximum distance from the task target
    pub max_distance: Option<f32>,
    /// Minimum health fraction
    pub min_health: Option<f32>,
}

impl Eligibility {
    pub fn categories(categories: CategorySet) -> Self {
        Self {
            categories,
            max_distance: None,
            min_health: None,
        }
    }

    pub fn combat() -> Self {
        Self::categories(CategorySet::combat())
    }

    pub fn within(mut self, max_distance: f32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn min_health(mut self, min_health: f32) -> Self {
        self.min_health = Some(min_health);
        self
    }

    /// Does `unit` qualify, given the task target's resolved position?
    ///
    /// The distance filter is ignored when the target cannot be resolved.
    pub fn matches(&self, unit: &Unit, target: Option<Vec2>) -> bool {
        if !unit.alive || !self.categories.contains(unit.category) {
            return false;
        }
        if let Some(min) = self.min_health {
            if unit.health < min {
                return false;
            }
        }
        match (self.max_distance, target) {
            (Some(max), Some(target)) => unit.position.within(target, max),
            _ => true,
        }
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Self::combat()
    }
}

/// A prioritized objective for this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub target: TaskTarget,
    pub priority: i32,
    pub eligibility: Eligibility,
    /// Take at most this many units (closest to the target first)
    pub unit_limit: Option<usize>,
}

impl Task {
    pub fn new(kind: TaskKind, target: TaskTarget, priority: i32) -> Self {
        Self {
            kind,
            target,
            priority,
            eligibility: Eligibility::default(),
            unit_limit: None,
        }
    }

    pub fn eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn limit(mut self, unit_limit: usize) -> Self {
        self.unit_limit = Some(unit_limit);
        self
    }
}

/// Light and air units, used for fast raids
pub fn raider_categories() -> CategorySet {
    CategorySet::of(&[UnitCategory::Light, UnitCategory::Air])
}

/// Units suited to scouting
pub fn scout_categories() -> CategorySet {
    CategorySet::of(&[UnitCategory::Light, UnitCategory::Worker])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_category_filter() {
        let rule = Eligibility::combat();
        assert!(rule.matches(&Unit::new(1, UnitCategory::Armored, Vec2::ZERO), None));
        assert!(!rule.matches(&Unit::new(2, UnitCategory::Worker, Vec2::ZERO), None));
        assert!(!rule.matches(&Unit::new(3, UnitCategory::Armored, Vec2::ZERO).dead(), None));
    }

    #[test]
    fn test_eligibility_distance_filter() {
        let rule = Eligibility::combat().within(10.0);
        let near = Unit::new(1, UnitCategory::Infantry, Vec2::new(6.0, 8.0));
        let far = Unit::new(2, UnitCategory::Infantry, Vec2::new(30.0, 0.0));

        assert!(rule.matches(&near, Some(Vec2::ZERO)));
        assert!(!rule.matches(&far, Some(Vec2::ZERO)));
        // unresolved target disables the distance check
        assert!(rule.matches(&far, None));
    }

    #[test]
    fn test_eligibility_health_filter() {
        let rule = Eligibility::combat().min_health(0.5);
        let hurt = Unit::new(1, UnitCategory::Infantry, Vec2::ZERO).with_health(0.2);
        assert!(!rule.matches(&hurt, None));
    }

    #[test]
    fn test_target_resolution() {
        let mut snapshot = WorldSnapshot::new(1);
        snapshot.hostile.push(Unit::new(42, UnitCategory::Siege, Vec2::new(5.0, 5.0)));

        assert_eq!(TaskTarget::Unit(UnitTag(42)).resolve(&snapshot), Some(Vec2::new(5.0, 5.0)));
        assert_eq!(TaskTarget::Unit(UnitTag(7)).resolve(&snapshot), None);
        assert_eq!(TaskTarget::None.resolve(&snapshot), None);
    }

    #[test]
    fn test_task_names_are_stable() {
        assert_eq!(TaskKind::BaseDefense.to_string(), "base_defense");
        assert_eq!(TaskKind::MainAttack.as_str(), "main_attack");
    }
}
