//! Synthetic world used by the demo driver
//!
//! A tiny stand-in for the simulation host: units walk toward their last
//! command, hostile raids spawn at the enemy start and march on the base, and
//! income trickles in every tick. Nothing here is part of the library.

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hivemind_core::scheduler::commands::{CommandAction, CommandIntent};
use hivemind_core::scheduler::Signals;
use hivemind_core::util::vec2::Vec2;
use hivemind_core::world::constants::timing::TICK_RATE;
use hivemind_core::world::snapshot::{
    ResourceTotals, Strongpoint, Tick, Unit, UnitCategory, UnitTag, WorldSnapshot,
};

const ENEMY_START: Vec2 = Vec2 { x: 400.0, y: 400.0 };
const EXPANSION_SITES: [Vec2; 2] = [Vec2 { x: 380.0, y: 120.0 }, Vec2 { x: 140.0, y: 360.0 }];

const UNIT_SPEED: f32 = 1.5;
const RAID_SPEED: f32 = 1.0;
const WEAPON_RANGE: f32 = 4.0;
const DAMAGE_PER_HIT: f32 = 0.04;
const RAID_INTERVAL: Tick = 220;
/// Expansions become known once the scout would plausibly have seen them
const EXPANSIONS_KNOWN_AT: Tick = 300;

const MINERAL_INCOME: u32 = 4;
const GAS_INCOME: u32 = 1;

const ARMY_MIX: [UnitCategory; 5] = [
    UnitCategory::Light,
    UnitCategory::Infantry,
    UnitCategory::Infantry,
    UnitCategory::Armored,
    UnitCategory::Air,
];
const RAID_MIX: [UnitCategory; 5] = [
    UnitCategory::Light,
    UnitCategory::Infantry,
    UnitCategory::Armored,
    UnitCategory::Siege,
    UnitCategory::Caster,
];

pub struct SyntheticWorld {
    rng: StdRng,
    tick: Tick,
    next_tag: u64,
    friendly: Vec<Unit>,
    hostile: Vec<Unit>,
    strongpoints: Vec<Strongpoint>,
    resources: ResourceTotals,
    /// Current move goal per friendly unit
    orders: HashMap<UnitTag, Vec2>,
}

impl SyntheticWorld {
    pub fn new(seed: u64) -> Self {
        let mut world = Self {
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
            next_tag: 1,
            friendly: Vec::new(),
            hostile: Vec::new(),
            strongpoints: vec![
                Strongpoint {
                    id: 1,
                    position: Vec2::ZERO,
                },
                Strongpoint {
                    id: 2,
                    position: Vec2::new(60.0, 20.0),
                },
            ],
            resources: ResourceTotals::new(300, 100),
            orders: HashMap::new(),
        };

        for _ in 0..10 {
            world.spawn_friendly(UnitCategory::Worker);
        }
        for i in 0..12 {
            world.spawn_friendly(ARMY_MIX[i % ARMY_MIX.len()]);
        }
        // Enemy main, a fixed target for attacks and scouting
        world.spawn_hostile(UnitCategory::Structure, ENEMY_START);
        world
    }

    fn home(&self) -> Vec2 {
        Vec2::centroid(self.strongpoints.iter().map(|s| s.position)).unwrap_or(Vec2::ZERO)
    }

    fn random_offset(&mut self, radius: f32) -> Vec2 {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..radius);
        Vec2::new(angle.cos(), angle.sin()) * distance
    }

    fn allocate_tag(&mut self) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    pub fn spawn_friendly(&mut self, category: UnitCategory) -> UnitTag {
        let tag = self.allocate_tag();
        let position = self.home() + self.random_offset(15.0);
        self.friendly.push(Unit::new(tag, category, position));
        UnitTag(tag)
    }

    fn spawn_hostile(&mut self, category: UnitCategory, position: Vec2) {
        let tag = self.allocate_tag() | 0x8000_0000;
        self.hostile.push(Unit::new(tag, category, position));
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            game_time_secs: self.tick as f32 / TICK_RATE as f32,
            friendly: self.friendly.clone(),
            hostile: self.hostile.clone(),
            strongpoints: self.strongpoints.clone(),
            resources: self.resources,
        }
    }

    pub fn signals(&self) -> Signals {
        let enemy_expansions = if self.tick >= EXPANSIONS_KNOWN_AT {
            EXPANSION_SITES.to_vec()
        } else {
            Vec::new()
        };
        Signals {
            enemy_start: Some(ENEMY_START),
            enemy_expansions,
            ..Signals::default()
        }
    }

    /// Workers busy mining, all but one
    pub fn mining_workers(&self) -> HashSet<UnitTag> {
        self.friendly
            .iter()
            .filter(|u| u.alive && u.category.is_worker())
            .skip(1)
            .map(|u| u.tag)
            .collect()
    }

    /// Turn command intents into move goals
    pub fn apply(&mut self, commands: &[CommandIntent]) {
        for command in commands {
            let goal = match command.action {
                CommandAction::Move(p) | CommandAction::AttackMove(p) => Some(p),
                CommandAction::Attack(tag) => self
                    .hostile
                    .iter()
                    .chain(self.friendly.iter())
                    .find(|u| u.tag == tag)
                    .map(|u| u.position),
                CommandAction::Hold => None,
            };
            match goal {
                Some(goal) => self.orders.insert(command.unit, goal),
                None => self.orders.remove(&command.unit),
            };
        }
    }

    /// Deduct a purchase from the bank; false if it cannot be afforded
    pub fn spend(&mut self, minerals: u32, gas: u32) -> bool {
        if self.resources.minerals < minerals || self.resources.gas < gas {
            return false;
        }
        self.resources.minerals -= minerals;
        self.resources.gas -= gas;
        true
    }

    pub fn live_counts(&self) -> (usize, usize) {
        (
            self.friendly.iter().filter(|u| u.alive).count(),
            self.hostile.iter().filter(|u| u.alive).count(),
        )
    }

    pub fn resources(&self) -> ResourceTotals {
        self.resources
    }

    /// Advance the world by one tick
    pub fn step(&mut self) {
        self.tick += 1;

        self.friendly.retain(|u| u.alive);
        self.hostile.retain(|u| u.alive);
        self.orders.retain(|tag, _| self.friendly.iter().any(|u| u.tag == *tag));

        self.resources.minerals += MINERAL_INCOME;
        self.resources.gas += GAS_INCOME;

        if self.tick % RAID_INTERVAL == 0 {
            self.spawn_raid();
        }

        for unit in &mut self.friendly {
            if let Some(goal) = self.orders.get(&unit.tag) {
                unit.position = unit.position.towards(*goal, UNIT_SPEED);
            }
        }

        let home = self.home();
        for unit in self.hostile.iter_mut().filter(|u| u.category != UnitCategory::Structure) {
            unit.position = unit.position.towards(home, RAID_SPEED);
        }

        self.resolve_combat();
    }

    fn spawn_raid(&mut self) {
        let size = self.rng.gen_range(3..=8);
        for _ in 0..size {
            let category = RAID_MIX[self.rng.gen_range(0..RAID_MIX.len())];
            let position = ENEMY_START + self.random_offset(20.0);
            self.spawn_hostile(category, position);
        }
    }

    /// Every combat unit in range lands one hit per tick
    fn resolve_combat(&mut self) {
        let mut friendly_hits = vec![0u32; self.friendly.len()];
        let mut hostile_hits = vec![0u32; self.hostile.len()];

        for (i, ours) in self.friendly.iter().enumerate() {
            for (j, theirs) in self.hostile.iter().enumerate() {
                if !ours.position.within(theirs.position, WEAPON_RANGE) {
                    continue;
                }
                if ours.category.is_combat() {
                    hostile_hits[j] += 1;
                }
                if theirs.category.is_combat() {
                    friendly_hits[i] += 1;
                }
            }
        }

        for (unit, hits) in self.friendly.iter_mut().zip(friendly_hits) {
            take_damage(unit, hits);
        }
        for (unit, hits) in self.hostile.iter_mut().zip(hostile_hits) {
            take_damage(unit, hits);
        }
    }
}

fn take_damage(unit: &mut Unit, hits: u32) {
    if hits == 0 {
        return;
    }
    unit.health = (unit.health - hits as f32 * DAMAGE_PER_HIT).max(0.0);
    if unit.health <= 0.0 {
        unit.alive = false;
    }
}
