use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, Millis, SystemClock},
    events::{Accepted, IgnoreReason, Submission},
    isbn::{PrefixRule, is_plausible_barcode},
    observers::ScanObserver,
    scan_state::ScanState,
};

/// Consecutive identical plausible reads needed before a candidate is accepted
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Minimum gap between two acceptances
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1200);

/// Transitions kept in the history before the oldest is dropped
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Tunables of a [`ScanStabilizer`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StabilizerConfig {
    /// Run length that triggers acceptance; 0 behaves like 1
    pub threshold: u32,
    /// Minimum interval between acceptances; zero disables the gate
    pub cooldown: Duration,
    /// Which 13-digit candidates are plausible
    pub prefix_rule: PrefixRule,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            prefix_rule: PrefixRule::default(),
        }
    }
}

impl StabilizerConfig {
    /// Replace the run-length threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the cooldown window
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Replace the 13-digit prefix rule
    #[must_use]
    pub fn with_prefix_rule(mut self, prefix_rule: PrefixRule) -> Self {
        self.prefix_rule = prefix_rule;
        self
    }

    /// Cooldown in whole milliseconds
    fn cooldown_ms(&self) -> Millis {
        u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Represents a state transition of the stabilizer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StateTransition {
    /// The state before the transition
    pub from: ScanState,
    /// The state after the transition
    pub to: ScanState,
    /// When the transition occurred
    pub at: Millis,
}

/// Turns a noisy stream of decoder reads into at most one acceptance per scan.
///
/// A candidate is accepted once the same plausible string has been submitted
/// `threshold` times in a row and the cooldown since the previous acceptance
/// has passed. Acceptance locks the stabilizer until [`ScanStabilizer::unlock`]
/// or [`ScanStabilizer::reset`] is called.
pub struct ScanStabilizer {
    /// Active tunables
    config: StabilizerConfig,
    /// Candidate of the current run
    last_code: Option<String>,
    /// Length of the current run
    same_count: u32,
    /// Time of the last acceptance; `None` is the far past
    last_accept_at: Option<Millis>,
    /// Accepted code while locked
    locked_code: Option<String>,
    /// Record of state transition history
    history: Vec<StateTransition>,
    /// Maximum number of history entries to keep
    max_history_size: usize,
    /// Registered observers
    observers: Vec<Box<dyn ScanObserver>>,
    /// Time source for [`ScanStabilizer::submit_now`]
    clock: Box<dyn Clock>,
}

// Manual implementation of Debug for ScanStabilizer
impl fmt::Debug for ScanStabilizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanStabilizer")
            .field("config", &self.config)
            .field("last_code", &self.last_code)
            .field("same_count", &self.same_count)
            .field("last_accept_at", &self.last_accept_at)
            .field("locked_code", &self.locked_code)
            .field("history", &self.history)
            .field("max_history_size", &self.max_history_size)
            .field("observers_count", &self.observers.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for ScanStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

impl ScanStabilizer {
    /// Create a stabilizer that reads the system clock
    #[must_use]
    pub fn new(config: StabilizerConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    /// Create a stabilizer with an explicit time source
    #[must_use]
    pub fn with_clock(config: StabilizerConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            last_code: None,
            same_count: 0,
            last_accept_at: None,
            locked_code: None,
            history: Vec::new(),
            max_history_size: DEFAULT_MAX_HISTORY,
            observers: Vec::new(),
            clock,
        }
    }

    /// Register an observer to be notified of transitions and acceptances
    pub fn register_observer(&mut self, observer: Box<dyn ScanObserver>) {
        self.observers.push(observer);
    }

    /// Change how many transitions are remembered
    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size;
        self.trim_history();
    }

    /// Submit a candidate read at the clock's current time
    pub fn submit_now(&mut self, candidate: &str) -> Submission {
        let at = self.clock.now_ms();
        self.submit(candidate, at)
    }

    /// Submit one decoder read taken at `at`.
    ///
    /// Never fails: anything that does not complete a stable run comes back as
    /// [`Submission::Ignored`] with the reason.
    pub fn submit(&mut self, candidate: &str, at: Millis) -> Submission {
        if self.locked_code.is_some() {
            return Submission::Ignored(IgnoreReason::Locked);
        }
        if candidate.is_empty() {
            return Submission::Ignored(IgnoreReason::Empty);
        }
        if !is_plausible_barcode(candidate, &self.config.prefix_rule) {
            tracing::trace!(candidate, "implausible candidate dropped");
            return Submission::Ignored(IgnoreReason::Implausible);
        }

        let before = self.state();

        if self.last_code.as_deref() == Some(candidate) {
            self.same_count = self.same_count.saturating_add(1);
        } else {
            self.last_code = Some(candidate.to_string());
            self.same_count = 1;
        }

        let submission = if let Some(remaining) = self.cooldown_remaining(at) {
            Submission::Ignored(IgnoreReason::CoolingDown { remaining })
        } else if self.same_count >= self.config.threshold.max(1) {
            self.last_accept_at = Some(at);
            self.locked_code = Some(candidate.to_string());
            Submission::Accepted(Accepted {
                code: candidate.to_string(),
                at,
                same_count: self.same_count,
            })
        } else {
            Submission::Ignored(IgnoreReason::Unstable { same_count: self.same_count })
        };

        let after = self.state();
        if before != after {
            self.record_transition(before, after, at);
        }
        match &submission {
            Submission::Accepted(accepted) => {
                for observer in &self.observers {
                    observer.on_accepted(accepted);
                }
            }
            Submission::Ignored(reason) => tracing::debug!(candidate, ?reason, "candidate held"),
        }

        submission
    }

    /// Release the lock taken by an acceptance.
    ///
    /// The repeat run starts over but the cooldown still counts from the last
    /// acceptance. Returns whether the stabilizer was locked.
    pub fn unlock(&mut self) -> bool {
        if self.locked_code.is_none() {
            return false;
        }
        let before = self.state();
        self.locked_code = None;
        self.last_code = None;
        self.same_count = 0;
        let at = self.clock.now_ms();
        self.record_transition(before, ScanState::Idle, at);
        true
    }

    /// Return to the initial state, forgetting the last acceptance time
    pub fn reset(&mut self) {
        let before = self.state();
        self.last_code = None;
        self.same_count = 0;
        self.last_accept_at = None;
        self.locked_code = None;
        if before != ScanState::Idle {
            let at = self.clock.now_ms();
            self.record_transition(before, ScanState::Idle, at);
        }
    }

    /// Get the current state of the stabilizer
    #[must_use]
    pub fn state(&self) -> ScanState {
        if let Some(code) = &self.locked_code {
            return ScanState::Locked(code.clone());
        }
        match &self.last_code {
            Some(code) => {
                ScanState::Accumulating { code: code.clone(), same_count: self.same_count }
            }
            None => ScanState::Idle,
        }
    }

    /// Whether an acceptance is waiting to be released
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_code.is_some()
    }

    /// Length of the current run
    #[must_use]
    pub fn same_count(&self) -> u32 {
        self.same_count
    }

    /// Candidate of the current run
    #[must_use]
    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    /// Time of the most recent acceptance
    #[must_use]
    pub fn last_accept_at(&self) -> Option<Millis> {
        self.last_accept_at
    }

    /// Active tunables
    #[must_use]
    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Get the complete transition history
    #[must_use]
    pub fn get_history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Time left in the cooldown window at `at`, if any
    fn cooldown_remaining(&self, at: Millis) -> Option<Duration> {
        let last = self.last_accept_at?;
        let window = self.config.cooldown_ms();
        let elapsed = at.saturating_sub(last);
        (elapsed < window).then(|| Duration::from_millis(window.saturating_sub(elapsed)))
    }

    /// Append a transition, notify observers and enforce the history limit
    fn record_transition(&mut self, from: ScanState, to: ScanState, at: Millis) {
        for observer in &self.observers {
            observer.on_state_change(&from, &to);
        }
        self.history.push(StateTransition { from, to, at });
        self.trim_history();
    }

    /// Drop the oldest entries beyond `max_history_size`
    fn trim_history(&mut self) {
        let excess = self.history.len().saturating_sub(self.max_history_size);
        if excess > 0 {
            self.history = self.history.split_off(excess);
        }
    }
}

// Implementing display for nicer output
impl fmt::Display for ScanStabilizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state().get_description())
    }
}

// Include tests module
#[cfg(test)]
mod tests;
