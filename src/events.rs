use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Millis;

/// A candidate accepted after a stable run of identical reads
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Accepted {
    /// The raw decoder string, exactly as submitted
    pub code: String,
    /// Time of the read that completed the run
    pub at: Millis,
    /// Length of the run when it was accepted
    pub same_count: u32,
}

/// Why a submitted candidate did not produce an acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum IgnoreReason {
    /// An earlier acceptance has not been released yet
    Locked,
    /// The decoder produced no text
    Empty,
    /// Wrong length or non-book prefix; the run counter is untouched
    Implausible,
    /// The run is still shorter than the threshold
    Unstable {
        /// Length of the current run
        same_count: u32,
    },
    /// The last acceptance was too recent
    CoolingDown {
        /// Time left before acceptances are allowed again
        remaining: Duration,
    },
}

/// Result of feeding one candidate to a stabilizer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Submission {
    /// The candidate completed a stable run
    Accepted(Accepted),
    /// The candidate was absorbed without an acceptance
    Ignored(IgnoreReason),
}

impl Submission {
    /// The acceptance, if there was one
    #[must_use]
    pub fn accepted(&self) -> Option<&Accepted> {
        match self {
            Self::Accepted(accepted) => Some(accepted),
            Self::Ignored(_) => None,
        }
    }

    /// Whether this submission was accepted
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}
