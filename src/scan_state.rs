use serde::{Deserialize, Serialize};

/// Represents the possible states of a scan stabilizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ScanState {
    /// No run of plausible candidates in progress
    #[default]
    Idle,
    /// A run of identical plausible candidates is being counted
    Accumulating {
        /// The candidate being repeated
        code: String,
        /// Consecutive identical reads so far, at least 1
        same_count: u32,
    },
    /// A candidate was accepted; nothing is processed until unlocked
    Locked(String),
}

impl ScanState {
    /// Get a human-readable description of the current state
    #[must_use]
    pub fn get_description(&self) -> String {
        match self {
            Self::Idle => "Waiting for a plausible barcode".to_string(),
            Self::Accumulating { code, same_count } => {
                format!("Seen {code} {same_count} time(s) in a row")
            }
            Self::Locked(code) => format!("Accepted {code}, waiting to be unlocked"),
        }
    }

    /// Short label used in logs and graphs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Accumulating { .. } => "Accumulating",
            Self::Locked(_) => "Locked",
        }
    }

    /// Whether the stabilizer is refusing candidates
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}
