pub mod cache;
pub mod core;
pub mod index;
pub mod stats;

pub use crate::cache::{BoundedCache, CoherentRegistry};
pub use crate::core::{AttributeKey, Entry, EntryId, RegistryError};
pub use crate::index::{AttributeIndex, Registry};
