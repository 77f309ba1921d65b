//! Barcode scanning core for a personal book library.
//!
//! This crate validates ISBN-10/ISBN-13 checksums, stabilizes a noisy stream
//! of barcode decoder reads into single acceptances, and keeps a small
//! multi-reader book list with JSON persistence.

pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod isbn;
pub mod library;
pub mod observers;
pub mod scan_state;
pub mod session;
pub mod stabilizer;
pub mod store;
pub mod telemetry;
pub mod visualization;

pub use error::{ConfigError, LibraryError};
pub use events::{Accepted, IgnoreReason, Submission};
pub use isbn::{Isbn, IsbnError, PrefixRule, is_plausible_barcode, is_valid_isbn, normalize};
pub use library::{BookRecord, Library, LibraryQuery};
pub use scan_state::ScanState;
pub use session::{ScanSession, SessionEvent};
pub use stabilizer::{ScanStabilizer, StabilizerConfig};
pub use visualization::StabilizerVisualization;
