//! Integration tests for the ledger service.

pub mod confirmation;
pub mod end_to_end;
pub mod paging;
