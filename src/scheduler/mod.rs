//! Per-tick scheduling pipeline
//!
//! throttle gate -> spatial cache reset -> task evaluation -> greedy
//! allocation -> dispatch to executors -> command buffer

pub mod allocator;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod evaluator;
pub mod performance;
pub mod priority;
pub mod task;
pub mod throttle;

pub use allocator::{allocate, Allocation, Assignment, UnitPool};
pub use context::{SchedulerContext, TickOutcome};
pub use evaluator::{Signals, TaskEvaluator};
pub use priority::{PriorityTable, StrategyMode};
pub use task::{Task, TaskKind, TaskTarget};
pub use throttle::ExecutionThrottle;
