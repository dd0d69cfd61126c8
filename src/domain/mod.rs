//! Data structures for package content.

pub mod resource;

pub use resource::{Resource, ResourceKind};
