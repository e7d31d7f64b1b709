//! Core data models for container listings.
//!
//! An [`object::ObjectDescriptor`] is one blob as reported by the listing;
//! an [`collection::ObjectCollection`] is the ordered set of them that the
//! filters and renderers operate on.

pub mod collection;
pub mod object;

pub use collection::{ObjectCollection, PatternError, Table};
pub use object::{DescriptorError, ObjectDescriptor};
