pub mod bounded;
pub mod coherent;

pub use bounded::BoundedCache;
pub use coherent::CoherentRegistry;
