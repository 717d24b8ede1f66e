//! Hivemind decision core
//!
//! Real-time task scheduling and resource arbitration for an agent that
//! controls a large population of units in a fixed-rate simulation.
//!
//! Each tick the [`scheduler::SchedulerContext`] decides whether to run a full
//! pass, enumerates prioritized tasks, greedily assigns free units to them and
//! hands the assignments to per-task executors. The [`ledger::ResourceLedger`]
//! arbitrates the two currencies between concurrent subsystems on the side.

pub mod config;
pub mod ledger;
pub mod metrics;
pub mod scheduler;
pub mod util;
pub mod world;
