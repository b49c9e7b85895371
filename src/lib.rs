//! novelshelf - web novel reading backend
//!
//! Follow and read-history bookkeeping for novels hosted on a third-party site,
//! guarded by date-scoped request signatures and rotating JWT sessions.

pub mod app;
pub mod core;
