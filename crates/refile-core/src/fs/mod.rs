//! File system abstractions.
//!
//! Walking and scanning ([`scan`]), streaming fingerprints ([`hash`]), the
//! records a walk produces ([`entry`]), and the raw mutations the operator
//! builds on ([`ops`]).

pub mod entry;
pub mod hash;
pub mod ops;
pub mod scan;

pub use entry::{FileRecord, FingerprintedFile};
pub use hash::{fingerprint, HashAlgorithm};
pub use scan::{scan, ScanOptions, ScanOutcome, ScanStats};
