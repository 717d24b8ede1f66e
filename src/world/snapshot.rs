//! Per-tick world snapshot
//!
//! The decision core never mutates simulation state. Every tick it receives an
//! immutable [`WorldSnapshot`] and only emits command intents.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::vec2::Vec2;

/// Simulation step counter
pub type Tick = u64;

/// Stable opaque unit identity assigned by the simulation host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitTag(pub u64);

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Capability class of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCategory {
    Worker,
    Light,
    Infantry,
    Armored,
    Siege,
    Caster,
    Air,
    Detector,
    Structure,
}

impl UnitCategory {
    pub const ALL: [UnitCategory; 9] = [
        UnitCategory::Worker,
        UnitCategory::Light,
        UnitCategory::Infantry,
        UnitCategory::Armored,
        UnitCategory::Siege,
        UnitCategory::Caster,
        UnitCategory::Air,
        UnitCategory::Detector,
        UnitCategory::Structure,
    ];

    #[inline]
    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn is_worker(self) -> bool {
        matches!(self, UnitCategory::Worker)
    }

    /// Units that can be sent into a fight
    pub fn is_combat(self) -> bool {
        !matches!(
            self,
            UnitCategory::Worker | UnitCategory::Detector | UnitCategory::Structure
        )
    }

    pub fn is_airborne(self) -> bool {
        matches!(self, UnitCategory::Air)
    }
}

/// Compact set of unit categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CategorySet(u16);

impl CategorySet {
    pub const EMPTY: CategorySet = CategorySet(0);

    pub fn of(categories: &[UnitCategory]) -> Self {
        categories.iter().fold(Self::EMPTY, |set, c| set.with(*c))
    }

    /// Every category for which [`UnitCategory::is_combat`] holds
    pub fn combat() -> Self {
        Self(
            UnitCategory::ALL
                .iter()
                .filter(|c| c.is_combat())
                .fold(0, |bits, c| bits | c.bit()),
        )
    }

    /// Categories that carry disproportionate weight in threat scoring
    pub fn high_threat() -> Self {
        Self::of(&[UnitCategory::Siege, UnitCategory::Caster])
    }

    #[must_use]
    pub fn with(self, category: UnitCategory) -> Self {
        Self(self.0 | category.bit())
    }

    #[inline]
    pub fn contains(&self, category: UnitCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// A unit as seen in one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub tag: UnitTag,
    pub position: Vec2,
    pub category: UnitCategory,
    /// Remaining health as a fraction of maximum (0.0-1.0)
    pub health: f32,
    pub alive: bool,
    pub airborne: bool,
}

impl Unit {
    pub fn new(tag: u64, category: UnitCategory, position: Vec2) -> Self {
        Self {
            tag: UnitTag(tag),
            position,
            category,
            health: 1.0,
            alive: true,
            airborne: category.is_airborne(),
        }
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health.clamp(0.0, 1.0);
        self
    }

    pub fn airborne(mut self, airborne: bool) -> Self {
        self.airborne = airborne;
        self
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }
}

/// A defensible friendly structure used as an anchor for threat checks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strongpoint {
    pub id: u64,
    pub position: Vec2,
}

/// Global currency totals reported by the simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub minerals: u32,
    pub gas: u32,
}

impl ResourceTotals {
    pub fn new(minerals: u32, gas: u32) -> Self {
        Self { minerals, gas }
    }
}

/// Immutable world state for a single tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub game_time_secs: f32,
    pub friendly: Vec<Unit>,
    /// Hostile units currently observed
    pub hostile: Vec<Unit>,
    pub strongpoints: Vec<Strongpoint>,
    pub resources: ResourceTotals,
}

impl WorldSnapshot {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    /// Nothing observed at all (no units and no strongpoints)
    pub fn is_empty(&self) -> bool {
        self.friendly.is_empty() && self.hostile.is_empty() && self.strongpoints.is_empty()
    }

    /// Live friendly unit by tag
    pub fn friendly_unit(&self, tag: UnitTag) -> Option<&Unit> {
        self.friendly.iter().find(|u| u.tag == tag && u.alive)
    }

    /// Live unit by tag on either side
    pub fn any_unit(&self, tag: UnitTag) -> Option<&Unit> {
        self.friendly
            .iter()
            .chain(self.hostile.iter())
            .find(|u| u.tag == tag && u.alive)
    }

    pub fn live_friendly(&self) -> impl Iterator<Item = &Unit> {
        self.friendly.iter().filter(|u| u.alive)
    }

    pub fn live_hostile(&self) -> impl Iterator<Item = &Unit> {
        self.hostile.iter().filter(|u| u.alive)
    }

    /// Live friendly units able to fight
    pub fn army_size(&self) -> usize {
        self.live_friendly().filter(|u| u.category.is_combat()).count()
    }

    /// Centroid of all strongpoints, `None` when every strongpoint is lost
    pub fn home(&self) -> Option<Vec2> {
        Vec2::centroid(self.strongpoints.iter().map(|s| s.position))
    }
}
