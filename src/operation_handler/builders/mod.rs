//! Builder utilities for operation handler types
//!
//! Builder implementations are available through impl blocks on the core
//! types, so nothing is re-exported here.

pub mod request;
