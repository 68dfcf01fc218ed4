//! Test harness

mod db_manager;

pub use db_manager::{TestDatabaseManager, TEST_DIMENSIONS};
