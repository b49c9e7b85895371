//! Reader shelf: followed novels and reading progress

pub mod api;

pub use api::{ShelfApiState, ShelfError, shelf_api_router};
