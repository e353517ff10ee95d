//! Ledger entries: the protected resource behind the access-control core.

pub mod handlers;

pub use handlers::{create_entry, get_entry, list_entries};
