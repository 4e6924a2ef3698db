//! Key/value type contracts for pattern-job ports.
//!
//! Architecture role:
//! - parses and represents the key/value [`Schema`] pairs declared on
//!   pattern-actor ports
//! - defines the [`Value`]/[`Record`] tokens that flow through stub channels
//! - resolves input/output format names to their default schemas
//!
//! Key modules:
//! - [`types`]
//! - [`value`]
//! - [`format`]
//!
//! Everything here is pure data plus validation; no I/O.

pub mod format;
pub mod types;
pub mod value;

pub use format::{Direction, Format, FormatRegistry};
pub use types::{key_value_array_type, parse_key_value_types, KeyValueSchema, Primitive, Schema};
pub use value::{Record, Value};
