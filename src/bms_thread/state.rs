use crate::types::ThreadState;

/// What the caller has to do after a state update.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateAction {
    None,
    /// Fault seen for the first time: sleep the extra recovery delay.
    ExtendCycle,
    /// Fault latched or still present: drive the fault line.
    AssertFault,
}

/// Debounced fault lifecycle. A violation must be seen on two consecutive
/// cycles before it latches, and a latched fault never clears.
#[derive(Debug, Default)]
pub struct ThreadStateMachine {
    state: ThreadState,
}

impl ThreadStateMachine {
    pub const fn new() -> Self {
        ThreadStateMachine {
            state: ThreadState::Startup,
        }
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Self test finished, whatever its outcome.
    pub fn startup_complete(&mut self) {
        if self.state == ThreadState::Startup {
            self.state = ThreadState::Idle;
        }
    }

    /// Feeds this cycle's evaluation result.
    pub fn on_evaluation(&mut self, fault_present: bool) -> StateAction {
        if !fault_present {
            return StateAction::None;
        }

        match self.state {
            ThreadState::Startup => StateAction::None,
            ThreadState::Idle => {
                self.state = ThreadState::FaultRecover;
                StateAction::ExtendCycle
            }
            ThreadState::FaultRecover => {
                self.state = ThreadState::Fault;
                StateAction::AssertFault
            }
            ThreadState::Fault => StateAction::AssertFault,
        }
    }

    /// Called after the snapshot is out. Clears the debounce if the cycle was clean.
    pub fn end_of_cycle(&mut self, fault_present: bool) {
        if self.state == ThreadState::FaultRecover && !fault_present {
            self.state = ThreadState::Idle;
        }
    }
}
