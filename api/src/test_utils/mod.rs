//! Test utilities
//!
//! Hand-written in-memory adapters, fixtures and a harness that wires them
//! into the application services.
//!
//! The in-memory repositories enforce the same optimistic version check as
//! the Postgres adapters, so conflict handling is exercised without a database.

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
