//! Lead discovery pipeline: search-term selection, snapshot lifecycle
//! management, record extraction, and run orchestration.

pub mod coordinator;
pub mod driver;
pub mod extractor;
pub mod keywords;
pub mod platform;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
