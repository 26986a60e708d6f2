//! Core domain types
//!
//! Shared between the client (which decodes backend responses into them) and
//! the runner (which drives job records through their lifecycle).

pub mod job;
pub mod scan;
