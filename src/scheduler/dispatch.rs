//! Hands allocations to per-task executors
//!
//! One executor per [`TaskKind`] turns an assignment into concrete commands.
//! A failure for one unit (it died since allocation, the buffer is full, ...)
//! is logged and counted, and the loop moves on to the next unit.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::scheduler::allocator::{Allocation, Assignment};
use crate::scheduler::commands::{CommandAction, CommandIntent, CommandSender};
use crate::scheduler::task::{TaskKind, TaskTarget};
use crate::world::constants::rally::HOLD_RADIUS;
use crate::world::snapshot::{Unit, UnitTag, WorldSnapshot};

/// Per-unit dispatch failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unit {0} is no longer alive")]
    UnitGone(UnitTag),
    #[error("target of task {0} could not be resolved")]
    TargetUnresolved(TaskKind),
    #[error("command buffer is full")]
    BufferFull,
    #[error("executor rejected command: {0}")]
    Rejected(String),
}

/// Turns one assignment into commands for one unit
pub trait TaskExecutor: Send {
    fn execute(
        &mut self,
        snapshot: &WorldSnapshot,
        unit: &Unit,
        assignment: &Assignment,
    ) -> Result<(), DispatchError>;
}

/// Outcome counters of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: usize,
    /// Units whose task kind has no registered executor
    pub unhandled: usize,
}

/// Routes task groups to their executors
#[derive(Default)]
pub struct Dispatcher {
    executors: HashMap<TaskKind, Box<dyn TaskExecutor>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with a [`CommandExecutor`] registered for every task kind
    pub fn with_command_executors(sender: CommandSender) -> Self {
        let mut dispatcher = Self::new();
        for kind in [
            TaskKind::BaseDefense,
            TaskKind::ExpansionDenial,
            TaskKind::MainAttack,
            TaskKind::Harass,
            TaskKind::Scout,
            TaskKind::Rally,
        ] {
            dispatcher.register(kind, Box::new(CommandExecutor::new(sender.clone())));
        }
        dispatcher
    }

    /// Register (or replace) the executor for `kind`
    pub fn register(&mut self, kind: TaskKind, executor: Box<dyn TaskExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn has_executor(&self, kind: TaskKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Dispatch every group of the allocation in service order
    pub fn dispatch(&mut self, allocation: &Allocation, snapshot: &WorldSnapshot) -> DispatchReport {
        let mut report = DispatchReport::default();

        for group in &allocation.groups {
            let Some(executor) = self.executors.get_mut(&group.kind) else {
                debug!("No executor for {}, {} units left idle", group.kind, group.units.len());
                report.unhandled += group.units.len();
                continue;
            };

            let assignment = Assignment {
                kind: group.kind,
                target: group.target,
                priority: group.priority,
            };

            for &tag in &group.units {
                let result = match snapshot.friendly_unit(tag) {
                    Some(unit) => executor.execute(snapshot, unit, &assignment),
                    None => Err(DispatchError::UnitGone(tag)),
                };

                match result {
                    Ok(()) => report.dispatched += 1,
                    Err(e) => {
                        warn!("Dispatch of {} to {} failed: {}", tag, group.kind, e);
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Default executor: one command intent per unit into the command buffer
pub struct CommandExecutor {
    sender: CommandSender,
}

impl CommandExecutor {
    pub fn new(sender: CommandSender) -> Self {
        Self { sender }
    }

    fn action_for(
        snapshot: &WorldSnapshot,
        unit: &Unit,
        assignment: &Assignment,
    ) -> Result<CommandAction, DispatchError> {
        let engages = !matches!(assignment.kind, TaskKind::Scout | TaskKind::Rally);
        match assignment.target {
            TaskTarget::Unit(tag) if engages && snapshot.any_unit(tag).is_some() => {
                Ok(CommandAction::Attack(tag))
            }
            target => {
                let position = target
                    .resolve(snapshot)
                    .ok_or(DispatchError::TargetUnresolved(assignment.kind))?;
                if engages {
                    Ok(CommandAction::AttackMove(position))
                } else if assignment.kind == TaskKind::Rally
                    && unit.position.within(position, HOLD_RADIUS)
                {
                    Ok(CommandAction::Hold)
                } else {
                    Ok(CommandAction::Move(position))
                }
            }
        }
    }
}

impl TaskExecutor for CommandExecutor {
    fn execute(
        &mut self,
        snapshot: &WorldSnapshot,
        unit: &Unit,
        assignment: &Assignment,
    ) -> Result<(), DispatchError> {
        let action = Self::action_for(snapshot, unit, assignment)?;
        let intent = CommandIntent {
            unit: unit.tag,
            action,
            task: assignment.kind,
            tick: snapshot.tick,
        };
        if self.sender.try_submit(intent) {
            Ok(())
        } else {
            Err(DispatchError::BufferFull)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::allocator::TaskGroup;
    use crate::scheduler::commands::CommandBuffer;
    use crate::util::vec2::Vec2;
    use crate::world::snapshot::UnitCategory;

    fn snapshot() -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(3);
        for i in 1..=3 {
            snapshot
                .friendly
                .push(Unit::new(i, UnitCategory::Infantry, Vec2::new(i as f32, 0.0)));
        }
        snapshot
            .hostile
            .push(Unit::new(99, UnitCategory::Siege, Vec2::new(50.0, 0.0)));
        snapshot
    }

    fn allocation(groups: Vec<TaskGroup>) -> Allocation {
        let mut allocation = Allocation::default();
        for group in &groups {
            for tag in &group.units {
                allocation.assignments.insert(
                    *tag,
                    Assignment {
                        kind: group.kind,
                        target: group.target,
                        priority: group.priority,
                    },
                );
            }
        }
        allocation.groups = groups;
        allocation
    }

    fn group(kind: TaskKind, target: TaskTarget, units: &[u64]) -> TaskGroup {
        TaskGroup {
            kind,
            target,
            priority: 50,
            units: units.iter().map(|t| UnitTag(*t)).collect(),
        }
    }

    /// Fails for one specific unit
    struct Flaky {
        bad: UnitTag,
        seen: Vec<UnitTag>,
    }

    impl TaskExecutor for Flaky {
        fn execute(
            &mut self,
            _snapshot: &WorldSnapshot,
            unit: &Unit,
            _assignment: &Assignment,
        ) -> Result<(), DispatchError> {
            self.seen.push(unit.tag);
            if unit.tag == self.bad {
                Err(DispatchError::Rejected("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_command_executor_emits_intents() {
        let buffer = CommandBuffer::new(16);
        let mut dispatcher = Dispatcher::with_command_executors(buffer.sender());
        let snapshot = snapshot();

        let report = dispatcher.dispatch(
            &allocation(vec![
                group(TaskKind::BaseDefense, TaskTarget::Unit(UnitTag(99)), &[1]),
                group(TaskKind::Scout, TaskTarget::Position(Vec2::new(9.0, 9.0)), &[2]),
                group(TaskKind::MainAttack, TaskTarget::Position(Vec2::new(80.0, 0.0)), &[3]),
            ]),
            &snapshot,
        );
        assert_eq!(report.dispatched, 3);

        let intents = buffer.drain();
        assert_eq!(intents[0].action, CommandAction::Attack(UnitTag(99)));
        assert_eq!(intents[1].action, CommandAction::Move(Vec2::new(9.0, 9.0)));
        assert_eq!(intents[2].action, CommandAction::AttackMove(Vec2::new(80.0, 0.0)));
        assert!(intents.iter().all(|i| i.tick == 3));
    }

    #[test]
    fn test_rally_holds_units_already_there() {
        let buffer = CommandBuffer::new(16);
        let mut dispatcher = Dispatcher::with_command_executors(buffer.sender());

        let report = dispatcher.dispatch(
            &allocation(vec![group(
                TaskKind::Rally,
                TaskTarget::Position(Vec2::new(0.5, 0.0)),
                &[1, 3],
            )]),
            &snapshot(),
        );
        assert_eq!(report.dispatched, 2);

        let intents = buffer.drain();
        assert_eq!(intents[0].action, CommandAction::Hold);
        assert_eq!(intents[1].action, CommandAction::Move(Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn test_dead_unit_does_not_abort_loop() {
        let buffer = CommandBuffer::new(16);
        let mut dispatcher = Dispatcher::with_command_executors(buffer.sender());
        let mut snapshot = snapshot();
        snapshot.friendly[1].alive = false;

        let report = dispatcher.dispatch(
            &allocation(vec![group(
                TaskKind::MainAttack,
                TaskTarget::Position(Vec2::ZERO),
                &[1, 2, 3],
            )]),
            &snapshot,
        );
        assert_eq!(report, DispatchReport { dispatched: 2, failed: 1, unhandled: 0 });
        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn test_executor_error_is_per_unit() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            TaskKind::Harass,
            Box::new(Flaky {
                bad: UnitTag(1),
                seen: Vec::new(),
            }),
        );

        let report = dispatcher.dispatch(
            &allocation(vec![group(TaskKind::Harass, TaskTarget::None, &[1, 2, 3])]),
            &snapshot(),
        );
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 2);
    }

    #[test]
    fn test_missing_executor_counts_unhandled() {
        let mut dispatcher = Dispatcher::new();
        let report = dispatcher.dispatch(
            &allocation(vec![group(TaskKind::Rally, TaskTarget::None, &[1, 2])]),
            &snapshot(),
        );
        assert_eq!(report.unhandled, 2);
        assert!(!dispatcher.has_executor(TaskKind::Rally));
    }

    #[test]
    fn test_unresolved_target_fails() {
        let buffer = CommandBuffer::new(16);
        let mut dispatcher = Dispatcher::with_command_executors(buffer.sender());
        let report = dispatcher.dispatch(
            &allocation(vec![group(TaskKind::Scout, TaskTarget::None, &[1])]),
            &snapshot(),
        );
        assert_eq!(report.failed, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_fails_per_unit() {
        let buffer = CommandBuffer::new(1);
        let mut dispatcher = Dispatcher::with_command_executors(buffer.sender());
        let report = dispatcher.dispatch(
            &allocation(vec![group(
                TaskKind::Rally,
                TaskTarget::Position(Vec2::ZERO),
                &[1, 2, 3],
            )]),
            &snapshot(),
        );
        assert_eq!(report, DispatchReport { dispatched: 1, failed: 2, unhandled: 0 });
    }
}
