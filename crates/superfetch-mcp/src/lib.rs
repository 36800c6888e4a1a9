//! `superfetch` crate (library surface).
//!
//! The primary entrypoint for end users is the `superfetch` binary (HTTP
//! gateway + MCP stdio). This library exists so embedders can reuse the core
//! types without depending on internal crate layout.

pub use superfetch_core as core;
pub use superfetch_local as local;
