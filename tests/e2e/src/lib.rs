//! End-to-end test support for passage-probe
//!
//! - `harness`: isolated stores and sessions in temporary directories
//! - `mocks`: deterministic embedders and corpus fixtures

pub mod harness;

pub use harness::TestDatabaseManager;
pub use mocks::{FailingEmbedder, HashEmbedder, TestCorpus};
