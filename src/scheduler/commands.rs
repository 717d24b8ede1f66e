//! Outgoing command intents
//!
//! Executors push intents into a bounded crossbeam channel; the transport
//! layer drains it once per tick and turns intents into simulation commands.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::scheduler::task::TaskKind;
use crate::util::vec2::Vec2;
use crate::world::snapshot::{Tick, UnitTag};

/// What the unit should do
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommandAction {
    Move(Vec2),
    AttackMove(Vec2),
    Attack(UnitTag),
    Hold,
}

/// A command intent for one unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandIntent {
    pub unit: UnitTag,
    pub action: CommandAction,
    pub task: TaskKind,
    pub tick: Tick,
}

/// Bounded MPSC buffer of command intents
///
/// Executors submit without blocking; the transport drains all pending
/// intents after each scheduling pass.
pub struct CommandBuffer {
    sender: Sender<CommandIntent>,
    receiver: Receiver<CommandIntent>,
    capacity: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a sender handle for an executor
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Returns false if the buffer is full
    #[inline]
    pub fn try_submit(&self, intent: CommandIntent) -> bool {
        self.sender.try_send(intent).is_ok()
    }

    /// Drain all pending intents
    pub fn drain(&self) -> Vec<CommandIntent> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Cloneable sender handle held by executors
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<CommandIntent>,
}

impl CommandSender {
    /// Returns false if the buffer is full or gone
    #[inline]
    pub fn try_submit(&self, intent: CommandIntent) -> bool {
        self.sender.try_send(intent).is_ok()
    }
}
