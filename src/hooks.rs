// 9.4: observer seam for cooperating modules (rewards accounting). hooks are wired once when the
// engine is built. calls raised inside an operation are queued and delivered, in order, once the
// operation commits; an aborted operation notifies nobody.

use crate::position::Position;
use std::cell::RefCell;
use std::rc::Rc;

pub trait PositionHooks {
    /// Runs after a new position and its indexes are persisted.
    fn after_position_created(&mut self, position: &Position);

    /// Raised before an existing position is fee-synced. The position passed is the pre-sync
    /// snapshot, so observers still see the old debt.
    fn before_position_modified(&mut self, position: &Position);
}

/// Records every call. clones share one log, so a test can keep a handle after the engine
/// takes ownership of the hook.
#[derive(Debug, Clone, Default)]
pub struct HookLog {
    calls: Rc<RefCell<Vec<HookCall>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.borrow().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Created(u64),
    Modified(u64),
}

impl PositionHooks for HookLog {
    fn after_position_created(&mut self, position: &Position) {
        self.calls.borrow_mut().push(HookCall::Created(position.id.0));
    }

    fn before_position_modified(&mut self, position: &Position) {
        self.calls.borrow_mut().push(HookCall::Modified(position.id.0));
    }
}
