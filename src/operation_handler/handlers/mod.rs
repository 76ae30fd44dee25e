//! Operation handler modules
//!
//! - Record operations (find, save, remove)
//! - List operations (find all, find page)

pub mod crud;
pub mod query;
