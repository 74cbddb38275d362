pub mod entry;
pub mod error;
pub mod key;

pub use entry::*;
pub use error::*;
pub use key::*;
