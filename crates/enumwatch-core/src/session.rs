#![forbid(unsafe_code)]

//! Per-collection change session: the `Idle`/`Pending` state machine.
//!
//! ```text
//!   Idle --begin--> Pending --end--> Idle
//! ```
//!
//! `begin` in `Pending` and `end` in `Idle` are rejected here and reported by
//! the notifier according to its misuse policy. The session has no terminal
//! state; it cycles for the lifetime of its collection.

use std::cell::Cell;

use crate::descriptor::DescriptorShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Pending,
}

/// Outcome of a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    AlreadyPending { cycle: u64 },
    NotPending,
}

/// Change-session bookkeeping. Interior-mutable so it can live inside a
/// collection that is mutated through `&self`.
#[derive(Debug, Default)]
pub struct ChangeSession {
    state: Cell<SessionState>,
    /// Id of the current (or most recent) cycle. Bumped on each accepted begin.
    cycle: Cell<u64>,
    pending_shape: Cell<Option<DescriptorShape>>,
}

impl ChangeSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.get() == SessionState::Pending
    }

    /// Current cycle id. Zero before the first begin.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle.get()
    }

    /// Shape of the descriptor passed to the pending begin, if any.
    #[must_use]
    pub fn pending_shape(&self) -> Option<DescriptorShape> {
        self.pending_shape.get()
    }

    /// `Idle -> Pending`. Returns the new cycle id.
    pub(crate) fn enter(&self, shape: DescriptorShape) -> Result<u64, Transition> {
        if self.is_pending() {
            return Err(Transition::AlreadyPending {
                cycle: self.cycle.get(),
            });
        }
        let cycle = self.cycle.get().wrapping_add(1);
        self.cycle.set(cycle);
        self.pending_shape.set(Some(shape));
        self.state.set(SessionState::Pending);
        Ok(cycle)
    }

    /// `Pending -> Idle`. Returns the cycle id and the begin-time shape.
    pub(crate) fn exit(&self) -> Result<(u64, DescriptorShape), Transition> {
        if !self.is_pending() {
            return Err(Transition::NotPending);
        }
        let shape = self
            .pending_shape
            .take()
            .unwrap_or(DescriptorShape::Unspecified);
        self.state.set(SessionState::Idle);
        Ok((self.cycle.get(), shape))
    }
}
