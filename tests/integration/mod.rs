//! Store-level scenarios, grouped by the operation under test.

pub mod concurrency;
pub mod crud;
pub mod filter;
pub mod pagination;
pub mod patch;
