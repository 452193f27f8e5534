//! # Repository Implementations
//!
//! Each repository owns the SQL for one table:
//!
//! - [`queue`] - the local entry queue (`sync_entries`)
//! - [`credential`] - the single-row session store (`credential`)

pub mod credential;
pub mod queue;
