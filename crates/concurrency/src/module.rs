//! Lifecycle modules and transaction-specific storage
//!
//! External modules (statistics, logging) subscribe to descriptor lifecycle
//! events by implementing [`StmModule`]. Each hook receives a
//! [`ModuleContext`] giving access to the descriptor's specific slots, the
//! opaque per-thread storage modules keep their state in.

use greenstm_core::{AbortReason, Result, SlotId, StmError};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Maximum number of registered modules
pub const MAX_MODULES: usize = 16;

/// Maximum number of specific slots
pub const MAX_SPECIFIC: usize = 16;

/// Key of a specific slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecificKey(usize);

impl SpecificKey {
    /// Key for slot `index`; fails past [`MAX_SPECIFIC`]
    pub fn from_index(index: usize) -> Result<Self> {
        if index >= MAX_SPECIFIC {
            return Err(StmError::ResourceExhausted {
                resource: "specific slots",
                limit: MAX_SPECIFIC,
            });
        }
        Ok(SpecificKey(index))
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Value stored in a specific slot
pub type SpecificValue = Box<dyn Any + Send>;

/// The specific slots of one descriptor
pub struct SpecificSlots {
    values: Vec<Option<SpecificValue>>,
}

impl SpecificSlots {
    /// Create with every slot empty
    pub fn new() -> Self {
        SpecificSlots {
            values: (0..MAX_SPECIFIC).map(|_| None).collect(),
        }
    }

    /// Borrow the value in `key` if it has type `T`
    pub fn get<T: Any>(&self, key: SpecificKey) -> Option<&T> {
        self.values
            .get(key.0)
            .and_then(|v| v.as_ref())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrow the value in `key` if it has type `T`
    pub fn get_mut<T: Any>(&mut self, key: SpecificKey) -> Option<&mut T> {
        self.values
            .get_mut(key.0)
            .and_then(|v| v.as_mut())
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Store a value, returning the previous one
    pub fn set(&mut self, key: SpecificKey, value: SpecificValue) -> Option<SpecificValue> {
        self.values.get_mut(key.0).and_then(|v| v.replace(value))
    }

    /// Remove and return the value in `key`
    pub fn take(&mut self, key: SpecificKey) -> Option<SpecificValue> {
        self.values.get_mut(key.0).and_then(|v| v.take())
    }
}

impl Default for SpecificSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpecificSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.values.iter().filter(|v| v.is_some()).count();
        f.debug_struct("SpecificSlots").field("used", &used).finish()
    }
}

/// What a module hook can see of the descriptor
pub struct ModuleContext<'a> {
    slot: SlotId,
    retries: u64,
    abort_reason: Option<AbortReason>,
    specifics: &'a mut SpecificSlots,
}

impl<'a> ModuleContext<'a> {
    /// Build a context over a descriptor's slots
    pub fn new(
        slot: SlotId,
        retries: u64,
        abort_reason: Option<AbortReason>,
        specifics: &'a mut SpecificSlots,
    ) -> Self {
        ModuleContext {
            slot,
            retries,
            abort_reason,
            specifics,
        }
    }

    /// Slot of the descriptor
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Consecutive aborts before the current event
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Reason of the abort, in `on_abort`
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Borrow a specific value
    pub fn specific<T: Any>(&self, key: SpecificKey) -> Option<&T> {
        self.specifics.get(key)
    }

    /// Mutably borrow a specific value
    pub fn specific_mut<T: Any>(&mut self, key: SpecificKey) -> Option<&mut T> {
        self.specifics.get_mut(key)
    }

    /// Store a specific value
    pub fn set_specific(&mut self, key: SpecificKey, value: SpecificValue) {
        self.specifics.set(key, value);
    }

    /// Remove a specific value
    pub fn take_specific(&mut self, key: SpecificKey) -> Option<SpecificValue> {
        self.specifics.take(key)
    }
}

/// Subscriber to descriptor lifecycle events
///
/// Every hook defaults to doing nothing.
pub trait StmModule: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "module"
    }

    /// A thread registered with the engine
    fn on_thread_init(&self, _ctx: &mut ModuleContext<'_>) {}

    /// A thread is leaving the engine
    fn on_thread_exit(&self, _ctx: &mut ModuleContext<'_>) {}

    /// An outermost attempt started
    fn on_start(&self, _ctx: &mut ModuleContext<'_>) {}

    /// An outermost commit is about to run
    fn on_precommit(&self, _ctx: &mut ModuleContext<'_>) {}

    /// An attempt committed
    fn on_commit(&self, _ctx: &mut ModuleContext<'_>) {}

    /// An attempt rolled back
    fn on_abort(&self, _ctx: &mut ModuleContext<'_>) {}
}

/// Lifecycle event dispatched to modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleEvent {
    ThreadInit,
    ThreadExit,
    Start,
    Precommit,
    Commit,
    Abort,
}

pub(crate) fn notify(
    modules: &[Arc<dyn StmModule>],
    specifics: &mut SpecificSlots,
    slot: SlotId,
    retries: u64,
    abort_reason: Option<AbortReason>,
    event: ModuleEvent,
) {
    for module in modules {
        let mut ctx = ModuleContext::new(slot, retries, abort_reason, &mut *specifics);
        match event {
            ModuleEvent::ThreadInit => module.on_thread_init(&mut ctx),
            ModuleEvent::ThreadExit => module.on_thread_exit(&mut ctx),
            ModuleEvent::Start => module.on_start(&mut ctx),
            ModuleEvent::Precommit => module.on_precommit(&mut ctx),
            ModuleEvent::Commit => module.on_commit(&mut ctx),
            ModuleEvent::Abort => module.on_abort(&mut ctx),
        }
    }
}
