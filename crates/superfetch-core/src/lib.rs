//! `superfetch-core`: backend-agnostic types and the error taxonomy shared by
//! every superFetch component. No I/O lives here; implementations live in
//! `superfetch-local`, wiring lives in the `superfetch-mcp` binary crate.

pub mod auth;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod rate_limit;
pub mod session;
pub mod transform;

pub use error::{Error, Result};
