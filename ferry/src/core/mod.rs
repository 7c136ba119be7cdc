//! Deterministic, pure logic shared by ferry commands.
//!
//! Core modules must be free of I/O side effects. They parse captured git
//! output and name things; the `io` layer does the capturing.

pub mod changeset;
pub mod summary;
pub mod types;
