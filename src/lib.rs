#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types

//! Remote trigger for pre-configured shell tasks.
//!
//! Tasks are named shell commands loaded from a YAML file at startup and
//! exposed over a small HTTP API protected by a shared secret. Execution
//! runs through a concurrency-limited shell runner supporting line-by-line
//! and batch-script modes.

// Module declarations
pub mod runner;
pub mod server;
pub mod tasks;
