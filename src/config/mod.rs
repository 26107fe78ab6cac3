//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value to all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend topology is static
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BackendConfig;
pub use schema::ListenerConfig;
pub use schema::PolicyKind;
pub use schema::PollConfig;
pub use schema::ProbeConfig;
pub use schema::ProxyConfig;
pub use schema::ScoringConfig;
