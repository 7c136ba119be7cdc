//! I/O adapters: git subprocesses, HTTP, and the config file.

pub mod api;
pub mod config;
pub mod download;
pub mod git;
pub mod process;
