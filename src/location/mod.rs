pub mod memory;
pub mod provider;

pub use memory::MemoryLocation;
pub use provider::{FragmentListener, Location};
