//! Shared test fixtures for the Field Engineer workspace.
//!
//! Provides a single PostgreSQL testcontainer per test process, lazily
//! started on first use and cleaned up when the process exits. Fixtures
//! resolve to `None` when Docker is unavailable so callers can skip.

mod fixtures;

pub use fixtures::*;
