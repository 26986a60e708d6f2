//! Repository layer
//!
//! Repositories abstract communication with the scanning backend. They
//! provide a small, focused interface without any scheduling logic.
//!
//! The trait is the seam between the orchestration core and the wire: the
//! scheduler only ever sees `Ok(payload)` or `Err(reason)`.

mod scans;

// Re-export trait
pub use scans::ScanRepository;

// Re-export implementation
pub use scans::HttpScanRepository;

pub use scans::{Artifact, ArtifactSource};
