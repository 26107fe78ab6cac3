//! Process lifecycle: coordinated startup and shutdown.

pub mod shutdown;

pub use shutdown::Shutdown;
