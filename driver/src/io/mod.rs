//! Side-effecting helpers. Only configuration lives on disk; workflow state
//! stays in memory for the lifetime of an instance.

pub mod config;
