//! Scan session controller.
//!
//! A session owns a fresh [`ScanStabilizer`] for each start, forwards decoder
//! reads to it and turns acceptances into validated ISBNs. Lookups triggered by
//! an acceptance are the caller's business; stopping never waits on them.

use std::{fmt, rc::Rc};

use crate::{
    clock::{Clock, Millis, SystemClock},
    events::{Accepted, IgnoreReason, Submission},
    isbn::{Isbn, IsbnError},
    observers::ScanObserver,
    stabilizer::{ScanStabilizer, StabilizerConfig},
};

/// What a session made of one decoder read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// No acceptance; keep scanning
    Ignored(IgnoreReason),
    /// The session is stopped and dropped the read
    Inactive,
    /// A stable read that is a valid ISBN
    Scanned {
        /// The acceptance that produced it
        accepted: Accepted,
        /// Normalised ISBN
        isbn: Isbn,
    },
    /// A stable read that fails ISBN validation
    Rejected {
        /// The acceptance that produced it
        accepted: Accepted,
        /// Why validation failed
        error: IsbnError,
    },
}

/// Builds observers for every new stabilizer a session starts
pub type ObserverFactory = Box<dyn Fn() -> Vec<Box<dyn ScanObserver>>>;

/// Start/stop controller around a per-session stabilizer
pub struct ScanSession {
    /// Tunables handed to every new stabilizer
    config: StabilizerConfig,
    /// Stabilizer of the running session
    stabilizer: Option<ScanStabilizer>,
    /// Clock for [`ScanSession::feed_now`], shared with every stabilizer
    clock: Rc<dyn Clock>,
    /// Observers attached on each start
    observer_factory: Option<ObserverFactory>,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("config", &self.config)
            .field("stabilizer", &self.stabilizer)
            .field("clock", &self.clock)
            .field("has_observer_factory", &self.observer_factory.is_some())
            .finish()
    }
}

impl ScanSession {
    /// Create a stopped session
    #[must_use]
    pub fn new(config: StabilizerConfig) -> Self {
        Self { config, stabilizer: None, clock: Rc::new(SystemClock), observer_factory: None }
    }

    /// Use `clock` for [`ScanSession::feed_now`] and for the stabilizer's own
    /// timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Rc::from(clock);
        self
    }

    /// Attach the observers built by `factory` to every started stabilizer
    #[must_use]
    pub fn with_observers(mut self, factory: ObserverFactory) -> Self {
        self.observer_factory = Some(factory);
        self
    }

    /// Begin a session with a fresh stabilizer; a running session is kept
    pub fn start(&mut self) {
        if self.stabilizer.is_some() {
            return;
        }
        let mut stabilizer =
            ScanStabilizer::with_clock(self.config.clone(), Box::new(Rc::clone(&self.clock)));
        if let Some(factory) = &self.observer_factory {
            for observer in factory() {
                stabilizer.register_observer(observer);
            }
        }
        tracing::debug!(threshold = self.config.threshold, "scan session started");
        self.stabilizer = Some(stabilizer);
    }

    /// End the session, discarding all stabilizer state. Always safe to call.
    pub fn stop(&mut self) {
        if self.stabilizer.take().is_some() {
            tracing::debug!("scan session stopped");
        }
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stabilizer.is_some()
    }

    /// Whether the running session is waiting on an acceptance
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.stabilizer.as_ref().is_some_and(ScanStabilizer::is_locked)
    }

    /// Continue scanning after an acceptance was handled
    pub fn unlock(&mut self) -> bool {
        self.stabilizer.as_mut().is_some_and(ScanStabilizer::unlock)
    }

    /// Stabilizer of the running session
    #[must_use]
    pub fn stabilizer(&self) -> Option<&ScanStabilizer> {
        self.stabilizer.as_ref()
    }

    /// Feed one decoder read taken at the clock's current time
    pub fn feed_now(&mut self, code: &str) -> SessionEvent {
        let at = self.clock.now_ms();
        self.feed(code, at)
    }

    /// Feed one decoder read taken at `at`
    pub fn feed(&mut self, code: &str, at: Millis) -> SessionEvent {
        let Some(stabilizer) = self.stabilizer.as_mut() else {
            return SessionEvent::Inactive;
        };
        match stabilizer.submit(code, at) {
            Submission::Ignored(reason) => SessionEvent::Ignored(reason),
            Submission::Accepted(accepted) => validate_accepted(accepted),
        }
    }

    /// Validate a manually typed ISBN without going through the stabilizer
    ///
    /// # Errors
    ///
    /// Returns the `IsbnError` describing why `raw` is not a valid ISBN.
    pub fn enter_manual(raw: &str) -> Result<Isbn, IsbnError> {
        Isbn::parse(raw.trim())
    }
}

/// Run the checksum on an accepted candidate
fn validate_accepted(accepted: Accepted) -> SessionEvent {
    match Isbn::parse(&accepted.code) {
        Ok(isbn) => {
            tracing::info!(%isbn, "scanned ISBN");
            SessionEvent::Scanned { accepted, isbn }
        }
        Err(error) => {
            tracing::warn!(code = %accepted.code, "accepted barcode failed validation: {error}");
            SessionEvent::Rejected { accepted, error }
        }
    }
}
