use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Whether calls may trigger compilation at all. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    Static,
    Dynamic,
}

/// Compilation phase. Moves from `Open` to `Frozen` once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Frozen { specializations: NonZeroUsize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    dispatch: Dispatch,
    phase: Phase,
}

impl Lifecycle {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            phase: Phase::Open,
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_dynamic(&self) -> bool {
        self.dispatch == Dispatch::Dynamic
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.phase, Phase::Frozen { .. })
    }

    /// Calls go straight to the aggregate function, with no resolution.
    pub fn fast_path(&self) -> bool {
        self.is_frozen() || !self.is_dynamic()
    }

    /// Freeze with `specializations` compiled so far. Returns `false`,
    /// leaving the phase unchanged, when there are none.
    pub fn freeze(&mut self, specializations: usize) -> bool {
        match NonZeroUsize::new(specializations) {
            Some(specializations) => {
                self.phase = Phase::Frozen { specializations };
                true
            }
            None => false,
        }
    }
}
