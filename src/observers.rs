use std::{cell::RefCell, rc::Rc, sync::mpsc::Sender};

use crate::{events::Accepted, scan_state::ScanState};

/// Trait for stabilizer observation
///
/// Both hooks default to doing nothing so a sink only implements what it needs.
pub trait ScanObserver {
    /// Called when the stabilizer moves between states
    fn on_state_change(&self, _from: &ScanState, _to: &ScanState) {}

    /// Called once for every accepted candidate
    fn on_accepted(&self, _accepted: &Accepted) {}
}

/// Logs every transition through `tracing`; acceptances are logged by the session
#[derive(Debug)]
pub struct TransitionLogger;

impl ScanObserver for TransitionLogger {
    fn on_state_change(&self, from: &ScanState, to: &ScanState) {
        tracing::trace!(from = from.label(), to = to.label(), "stabilizer transition");
    }
}

/// Forwards every acceptance into an mpsc channel
#[derive(Debug)]
pub struct ChannelSink {
    /// Sending half; the session owner holds the receiver
    sender: Sender<Accepted>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel
    #[must_use]
    pub fn new(sender: Sender<Accepted>) -> Self {
        Self { sender }
    }
}

impl ScanObserver for ChannelSink {
    fn on_accepted(&self, accepted: &Accepted) {
        if let Err(err) = self.sender.send(accepted.clone()) {
            tracing::debug!("acceptance receiver dropped: {err}");
        }
    }
}

/// Keeps every acceptance in memory, in order
#[derive(Debug, Clone, Default)]
pub struct AcceptanceRecorder {
    /// Shared with clones so the caller can read after registering
    accepted: Rc<RefCell<Vec<Accepted>>>,
}

impl AcceptanceRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    #[must_use]
    pub fn accepted(&self) -> Vec<Accepted> {
        self.accepted.borrow().clone()
    }

    /// Codes of everything recorded so far
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        self.accepted.borrow().iter().map(|a| a.code.clone()).collect()
    }
}

impl ScanObserver for AcceptanceRecorder {
    fn on_accepted(&self, accepted: &Accepted) {
        self.accepted.borrow_mut().push(accepted.clone());
    }
}
