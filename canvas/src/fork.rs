//! Local speculative fork over the confirmed canvas state.
//!
//! While a local command waits for server confirmation it lives here, applied
//! to the visible canvas but not to authoritative history. The fork keeps a
//! checkpoint of the confirmed state taken just before the first speculative
//! command, so the engine can unwind and replay when the server confirms
//! commands in a different interleaving.

#[cfg(test)]
#[path = "fork_test.rs"]
mod fork_test;

use std::collections::VecDeque;

use commands::Command;

use crate::doc::CanvasState;

/// What reconciliation concluded about a fork entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkEntryState {
    /// Still waiting for the server's confirmation.
    Pending,
    /// Confirmed exactly as predicted; the speculative application stands.
    ConfirmedMatch,
    /// The server confirmed something else first, or re-validation failed;
    /// the speculative application was rolled back.
    Superseded,
}

/// One speculatively applied local command.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkEntry {
    pub command: Command,
    pub state: ForkEntryState,
}

/// Queue of unconfirmed local commands plus the checkpoint they fork from.
///
/// This is deliberately a dumb container; the unwind-and-replay decisions
/// live in the engine, which owns both the fork and the visible state.
#[derive(Debug, Default)]
pub struct LocalFork {
    entries: VecDeque<ForkEntry>,
    checkpoint: Option<CanvasState>,
}

impl LocalFork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any local command is still awaiting confirmation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// The confirmed state this fork branched from, while active.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&CanvasState> {
        self.checkpoint.as_ref()
    }

    #[must_use]
    pub fn checkpoint_mut(&mut self) -> Option<&mut CanvasState> {
        self.checkpoint.as_mut()
    }

    /// Start a fork from `state` if one is not already in progress.
    pub fn begin(&mut self, state: &CanvasState) {
        if self.checkpoint.is_none() {
            self.checkpoint = Some(state.clone());
        }
    }

    /// Enqueue a speculatively applied local command.
    pub fn push(&mut self, command: Command) {
        self.entries.push_back(ForkEntry { command, state: ForkEntryState::Pending });
    }

    /// The oldest pending command, if any.
    #[must_use]
    pub fn head(&self) -> Option<&Command> {
        self.entries.front().map(|entry| &entry.command)
    }

    /// Remove and return the oldest entry, marked with its final state.
    pub fn pop(&mut self, state: ForkEntryState) -> Option<ForkEntry> {
        self.entries.pop_front().map(|mut entry| {
            entry.state = state;
            entry
        })
    }

    /// Drain all entries, e.g. for replay on top of a fresh checkpoint.
    pub fn take_entries(&mut self) -> Vec<ForkEntry> {
        self.entries.drain(..).collect()
    }

    /// Re-enqueue entries that survived a replay.
    pub fn restore_entries(&mut self, entries: Vec<ForkEntry>) {
        self.entries = entries.into();
    }

    /// Tear down the fork once nothing is pending.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.checkpoint = None;
    }
}
