//! Service layer
//!
//! Services contain business logic for the runner. They orchestrate the
//! scheduler stages over a repository and reduce the outcome to a verdict.
//!
//! Services are trait-based to enable testing and dependency injection.

mod batch;
pub mod verdict;

// Re-export traits
pub use batch::BatchService;

// Re-export implementations
pub use batch::{BatchReport, StandardBatchService};
