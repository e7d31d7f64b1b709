//! One handler per output mode.

pub mod download_handlers;
pub mod list_handlers;
