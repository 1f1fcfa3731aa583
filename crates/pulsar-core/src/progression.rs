//! # Progression State
//!
//! The per-user pointer to the current gate and cycle.
//!
//! ## Rules
//!
//! | Event | Effect |
//! |-------|--------|
//! | Solve gate `g`, `g == current_gate < 6` | `current_gate += 1` |
//! | Solve gate 6, `current_gate == 6` | `cycle_complete = true` |
//! | Solve gate `g`, `g != current_gate`, or cycle complete | nothing |
//! | Reset | `current_gate = 1`, `current_cycle = 1`, not complete |
//!
//! `current_gate` therefore never decreases except on reset. A completed
//! cycle stays on gate 6 and unlocks the cycle quiz.

use crate::primitives::GATE_COUNT;
use crate::{Cycle, Gate, PulsarError};
use serde::{Deserialize, Serialize};

/// Per-user progression pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub current_gate: Gate,
    pub current_cycle: Cycle,
    /// All six gates of the current cycle are cleared.
    pub cycle_complete: bool,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            current_gate: Gate::FIRST,
            current_cycle: Cycle::FIRST,
            cycle_complete: false,
        }
    }
}

/// What a puzzle solve did to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The solved gate was not the current gate.
    Held,
    /// Moved to the next gate within the cycle.
    NextGate,
    /// Cleared gate 6: the cycle is complete.
    CycleComplete,
}

impl Advance {
    #[must_use]
    pub const fn moved(self) -> bool {
        !matches!(self, Self::Held)
    }
}

/// Display status of a gate relative to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Cleared,
    Current,
    Locked,
}

impl ProgressionState {
    /// Create a fresh pointer at gate 1 of cycle 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `gate` may be attempted.
    #[must_use]
    pub fn is_unlocked(&self, gate: Gate) -> bool {
        gate <= self.current_gate
    }

    /// Refuse gates beyond the current one.
    pub fn ensure_unlocked(&self, gate: Gate) -> Result<(), PulsarError> {
        if self.is_unlocked(gate) {
            Ok(())
        } else {
            Err(PulsarError::GateLocked {
                requested: gate.number(),
                current: self.current_gate.number(),
            })
        }
    }

    /// Refuse the cycle quiz until gate 6 is cleared.
    ///
    /// The cycle quiz sits after the last gate, so it is reported as a
    /// locked gate `GATE_COUNT + 1`.
    pub fn ensure_cycle_complete(&self) -> Result<(), PulsarError> {
        if self.cycle_complete {
            Ok(())
        } else {
            Err(PulsarError::GateLocked {
                requested: GATE_COUNT + 1,
                current: self.current_gate.number(),
            })
        }
    }

    /// Apply a puzzle solve of `solved`.
    ///
    /// Pure equality check against the current gate: solving an earlier or a
    /// later gate never moves the pointer.
    pub fn advance(&mut self, solved: Gate) -> Advance {
        if self.cycle_complete || solved != self.current_gate {
            return Advance::Held;
        }
        match self.current_gate.next() {
            Some(next) => {
                self.current_gate = next;
                Advance::NextGate
            }
            None => {
                self.cycle_complete = true;
                Advance::CycleComplete
            }
        }
    }

    /// Back to gate 1 of cycle 1.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Status of `gate` relative to the pointer.
    #[must_use]
    pub fn status_of(&self, gate: Gate) -> GateStatus {
        if self.cycle_complete {
            return GateStatus::Cleared;
        }
        match gate.cmp(&self.current_gate) {
            std::cmp::Ordering::Less => GateStatus::Cleared,
            std::cmp::Ordering::Equal => GateStatus::Current,
            std::cmp::Ordering::Greater => GateStatus::Locked,
        }
    }

    /// All six gates with their status, in order.
    #[must_use]
    pub fn gates(&self) -> Vec<(Gate, GateStatus)> {
        Gate::all().map(|g| (g, self.status_of(g))).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(n: u8) -> Gate {
        Gate::new(n).expect("valid gate")
    }

    #[test]
    fn fresh_state_is_gate_one_cycle_one() {
        let state = ProgressionState::new();
        assert_eq!(state.current_gate, Gate::FIRST);
        assert_eq!(state.current_cycle, Cycle::FIRST);
    }

    #[test]
    fn solving_current_gate_advances_by_one() {
        let mut state = ProgressionState::new();
        assert_eq!(state.advance(gate(1)), Advance::NextGate);
        assert_eq!(state.current_gate, gate(2));
    }

    #[test]
    fn solving_other_gates_holds() {
        let mut state = ProgressionState::new();
        state.advance(gate(1));
        state.advance(gate(2));

        assert_eq!(state.advance(gate(1)), Advance::Held);
        assert_eq!(state.advance(gate(5)), Advance::Held);
        assert_eq!(state.current_gate, gate(3));
    }

    #[test]
    fn clearing_last_gate_completes_cycle_in_place() {
        let mut state = ProgressionState::new();
        for n in 1..=5 {
            assert_eq!(state.advance(gate(n)), Advance::NextGate);
        }
        assert!(state.ensure_cycle_complete().is_err());

        assert_eq!(state.advance(gate(6)), Advance::CycleComplete);
        assert_eq!(state.current_gate, Gate::LAST);
        assert_eq!(state.current_cycle, Cycle::FIRST);
        assert!(state.cycle_complete);
        assert!(state.ensure_cycle_complete().is_ok());

        // Nothing moves once the cycle is complete.
        assert_eq!(state.advance(gate(6)), Advance::Held);
        assert_eq!(state.advance(gate(1)), Advance::Held);
        assert_eq!(state.current_gate, Gate::LAST);
    }

    #[test]
    fn cycle_quiz_lock_reports_gate_after_last() {
        let state = ProgressionState::new();
        match state.ensure_cycle_complete() {
            Err(PulsarError::GateLocked { requested, current }) => {
                assert_eq!(requested, 7);
                assert_eq!(current, 1);
            }
            other => unreachable!("expected GateLocked, got {:?}", other),
        }
    }

    #[test]
    fn lock_check() {
        let mut state = ProgressionState::new();
        state.advance(gate(1));

        assert!(state.ensure_unlocked(gate(1)).is_ok());
        assert!(state.ensure_unlocked(gate(2)).is_ok());
        match state.ensure_unlocked(gate(3)) {
            Err(PulsarError::GateLocked { requested, current }) => {
                assert_eq!(requested, 3);
                assert_eq!(current, 2);
            }
            other => unreachable!("expected GateLocked, got {:?}", other),
        }
    }

    #[test]
    fn reset_returns_to_start() {
        let mut state = ProgressionState::new();
        for n in 1..=6 {
            state.advance(gate(n));
        }
        assert!(state.cycle_complete);
        state.reset();
        assert_eq!(state, ProgressionState::default());
    }

    #[test]
    fn completed_cycle_reports_every_gate_cleared() {
        let mut state = ProgressionState::new();
        for n in 1..=6 {
            state.advance(gate(n));
        }
        assert!(
            state
                .gates()
                .iter()
                .all(|(_, s)| *s == GateStatus::Cleared)
        );
    }

    #[test]
    fn gate_statuses() {
        let mut state = ProgressionState::new();
        state.advance(gate(1));
        state.advance(gate(2));

        let statuses: Vec<GateStatus> = state.gates().into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            statuses,
            vec![
                GateStatus::Cleared,
                GateStatus::Cleared,
                GateStatus::Current,
                GateStatus::Locked,
                GateStatus::Locked,
                GateStatus::Locked,
            ]
        );
    }
}
