//! Partner store implementations.

#[cfg(feature = "file-store")]
pub mod file;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file-store")]
pub use file::FilePartnerStore;

#[cfg(feature = "memory")]
pub use memory::MemoryPartnerStore;
