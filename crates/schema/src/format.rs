//! Input/output format registry.
//!
//! A format name on a data source/sink spec selects how records are produced
//! or consumed and which default key/value schema applies. The builtin table
//! mirrors the formats every engine must understand; engine-specific formats
//! can be registered on top.

use serde::{Deserialize, Serialize};

use crate::types::{KeyValueSchema, Primitive, Schema};

/// Whether a format reads data into a job or writes results out of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// One registered format.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub name: String,
    pub direction: Direction,
    /// Default key/value schema for ports bound to this format.
    pub key_value: KeyValueSchema,
    /// True when the real schema is derived from the delivered data rather
    /// than declared up front (inline token data).
    pub schema_from_data: bool,
    /// True when the format reads from or writes to a file path; such a
    /// path is then required on the spec.
    pub uses_path: bool,
}

/// Name-keyed registry of formats, seeded with the builtin table.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<Format>,
}

impl FormatRegistry {
    /// The builtin formats: line-oriented file input, inline token input,
    /// token capture output, and the discarding null output.
    pub fn builtin() -> Self {
        let string_string = KeyValueSchema::new(
            Schema::Primitive(Primitive::String),
            Schema::Primitive(Primitive::String),
        );
        let offset_line = KeyValueSchema::new(
            Schema::Primitive(Primitive::Long),
            Schema::Primitive(Primitive::String),
        );
        let nil_any = KeyValueSchema::new(
            Schema::Primitive(Primitive::Nil),
            Schema::Primitive(Primitive::Nil),
        );
        Self {
            formats: vec![
                Format {
                    name: "LineInputFormat".to_string(),
                    direction: Direction::Input,
                    key_value: offset_line,
                    schema_from_data: false,
                    uses_path: true,
                },
                Format {
                    name: "TokenInputFormat".to_string(),
                    direction: Direction::Input,
                    key_value: nil_any.clone(),
                    schema_from_data: true,
                    uses_path: false,
                },
                Format {
                    name: "TokenOutputFormat".to_string(),
                    direction: Direction::Output,
                    key_value: nil_any,
                    schema_from_data: true,
                    uses_path: false,
                },
                Format {
                    name: "TextOutputFormat".to_string(),
                    direction: Direction::Output,
                    key_value: string_string.clone(),
                    schema_from_data: false,
                    uses_path: true,
                },
                Format {
                    name: "NullOutputFormat".to_string(),
                    direction: Direction::Output,
                    key_value: string_string,
                    schema_from_data: false,
                    uses_path: false,
                },
            ],
        }
    }

    /// Register an engine-specific format.
    pub fn register(&mut self, format: Format) {
        self.formats.push(format);
    }

    /// Resolve a format by name and direction.
    pub fn resolve(&self, name: &str, direction: Direction) -> Option<&Format> {
        self.formats
            .iter()
            .find(|f| f.direction == direction && f.name == name)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
