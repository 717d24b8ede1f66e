//! Greedy unit allocation
//!
//! Tasks are served highest priority first. Each task takes the eligible units
//! it wants out of a shrinking pool, so a unit is never committed twice in the
//! same tick. Allocation is deterministic: equal priorities keep evaluator
//! order, and equally distant units are ordered by tag.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::util::vec2::Vec2;
use crate::world::snapshot::{Unit, UnitTag, WorldSnapshot};
use crate::scheduler::task::{Task, TaskKind, TaskTarget};

/// Units still free for allocation this tick
#[derive(Debug, Clone, Default)]
pub struct UnitPool {
    tags: HashSet<UnitTag>,
}

impl UnitPool {
    /// Live friendly units minus those locked by long-running missions
    pub fn from_snapshot(snapshot: &WorldSnapshot, locked: &HashSet<UnitTag>) -> Self {
        Self {
            tags: snapshot
                .live_friendly()
                .map(|u| u.tag)
                .filter(|tag| !locked.contains(tag))
                .collect(),
        }
    }

    pub fn from_tags(tags: impl IntoIterator<Item = UnitTag>) -> Self {
        Self {
            tags: tags.into_iter().collect(),
        }
    }

    pub fn contains(&self, tag: UnitTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn remove(&mut self, tag: UnitTag) -> bool {
        self.tags.remove(&tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Remaining tags in ascending order
    pub fn sorted(&self) -> Vec<UnitTag> {
        let mut tags: Vec<UnitTag> = self.tags.iter().copied().collect();
        tags.sort_unstable();
        tags
    }
}

/// What a unit was assigned to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub kind: TaskKind,
    pub target: TaskTarget,
    pub priority: i32,
}

/// Units taken by one task, in the order they were chosen
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub kind: TaskKind,
    pub target: TaskTarget,
    pub priority: i32,
    pub units: Vec<UnitTag>,
}

/// Result of one allocation pass
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub assignments: HashMap<UnitTag, Assignment>,
    /// Non-empty groups in the order tasks were served
    pub groups: Vec<TaskGroup>,
    /// Tasks that matched no unit
    pub skipped: Vec<TaskKind>,
    /// Units left over for the caller's idle/rally handling (ascending tags)
    pub unassigned: Vec<UnitTag>,
}

impl Allocation {
    pub fn get(&self, tag: UnitTag) -> Option<&Assignment> {
        self.assignments.get(&tag)
    }

    pub fn kind_of(&self, tag: UnitTag) -> Option<TaskKind> {
        self.assignments.get(&tag).map(|a| a.kind)
    }

    /// Number of units assigned to `kind`
    pub fn count(&self, kind: TaskKind) -> usize {
        self.groups
            .iter()
            .filter(|g| g.kind == kind)
            .map(|g| g.units.len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Order candidates closest-first to `target`, ties (or no target) by tag
fn order_candidates(candidates: &mut [&Unit], target: Option<Vec2>) {
    match target {
        Some(target) => candidates.sort_by(|a, b| {
            a.position
                .distance_sq_to(target)
                .total_cmp(&b.position.distance_sq_to(target))
                .then(a.tag.cmp(&b.tag))
        }),
        None => candidates.sort_by_key(|u| u.tag),
    }
}

/// Greedily assign pool units to tasks by descending priority
///
/// Pool tags that are missing or dead in `snapshot` are dropped silently. A
/// task with no eligible unit is skipped and lower-priority tasks still see
/// the remaining pool. No commands are issued here.
pub fn allocate(mut tasks: Vec<Task>, mut pool: UnitPool, snapshot: &WorldSnapshot) -> Allocation {
    let live: HashMap<UnitTag, &Unit> = snapshot.live_friendly().map(|u| (u.tag, u)).collect();
    pool.tags.retain(|tag| live.contains_key(tag));

    // stable: equal priorities keep evaluator emission order
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut allocation = Allocation::default();

    for task in tasks {
        if pool.is_empty() {
            allocation.skipped.push(task.kind);
            continue;
        }

        let target = task.target.resolve(snapshot);
        let mut candidates: Vec<&Unit> = pool
            .tags
            .iter()
            .filter_map(|tag| live.get(tag).copied())
            .filter(|unit| task.eligibility.matches(unit, target))
            .collect();
        order_candidates(&mut candidates, target);

        if let Some(limit) = task.unit_limit {
            candidates.truncate(limit);
        }

        if candidates.is_empty() {
            trace!("Task {} matched no units, skipping", task.kind);
            allocation.skipped.push(task.kind);
            continue;
        }

        let assignment = Assignment {
            kind: task.kind,
            target: task.target,
            priority: task.priority,
        };
        let units: Vec<UnitTag> = candidates.iter().map(|u| u.tag).collect();
        for tag in &units {
            pool.remove(*tag);
            allocation.assignments.insert(*tag, assignment);
        }

        trace!("Task {} took {} units", task.kind, units.len());
        allocation.groups.push(TaskGroup {
            kind: task.kind,
            target: task.target,
            priority: task.priority,
            units,
        });
    }

    allocation.unassigned = pool.sorted();
    allocation
}
