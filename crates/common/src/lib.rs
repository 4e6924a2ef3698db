//! Shared configuration, error types, and IDs for FDP crates.
//!
//! Architecture role:
//! - defines the dispatch configuration passed across layers
//! - provides the common [`DispatchError`] / [`Result`] contracts
//! - hosts typed run identifiers
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

pub mod config;
pub mod error;
pub mod ids;

pub use config::{DispatchConfig, EngineDescriptor, ServerConfig};
pub use error::{
    BootstrapError, ConfigError, DispatchError, EngineError, ResourceError, Result, RuntimeError,
    SchemaError, ValidationError,
};
pub use ids::RunId;
