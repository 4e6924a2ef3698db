//! Schema grammar and the canonical key/value wire shape.
//!
//! Type strings follow the form `KEYTYPE VALUETYPE` (commas tolerated and
//! stripped), where each type token is one of:
//! - a primitive name: `string`, `int`, `long`, `double`, `nil`
//! - `arrayType(TYPE)` for arrays
//! - `object` (opaque byte payload) or `object(TYPE)` (named opaque payload)

use std::fmt;

use fdp_common::SchemaError;
use serde::{Deserialize, Serialize};

/// Atomic schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    String,
    Int,
    Long,
    Double,
    Nil,
}

impl Primitive {
    fn name(self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Double => "double",
            Primitive::Nil => "nil",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Primitive::String),
            "int" => Some(Primitive::Int),
            "long" => Some(Primitive::Long),
            "double" => Some(Primitive::Double),
            "nil" => Some(Primitive::Nil),
            _ => None,
        }
    }
}

/// A structural type for one side of a key/value pair.
///
/// Immutable once built; equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schema {
    Primitive(Primitive),
    Array(Box<Schema>),
    Record(Vec<(String, Schema)>),
    /// A payload the type system does not inspect, tagged with the name of
    /// the carried class/shape. Bare `object` carries `byte[]`.
    Opaque(String),
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Primitive(p) => write!(f, "{}", p.name()),
            Schema::Array(inner) => write!(f, "arrayType({inner})"),
            Schema::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, schema)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {schema}")?;
                }
                write!(f, "}}")
            }
            Schema::Opaque(class) => {
                if class == "byte[]" {
                    write!(f, "object")
                } else {
                    write!(f, "object({class})")
                }
            }
        }
    }
}

/// The declared key/value type contract of one pattern-job port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueSchema {
    pub key: Schema,
    pub value: Schema,
}

impl KeyValueSchema {
    pub fn new(key: Schema, value: Schema) -> Self {
        Self { key, value }
    }

    /// The canonical wire shape for this contract: an array of
    /// `{key, value}` records.
    pub fn wire_shape(&self) -> Schema {
        key_value_array_type(self.key.clone(), self.value.clone())
    }
}

impl fmt::Display for KeyValueSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

/// Wrap key and value types as an array of `{key, value}` records, the
/// canonical shape for all pattern-actor ports.
pub fn key_value_array_type(key: Schema, value: Schema) -> Schema {
    Schema::Array(Box::new(Schema::Record(vec![
        ("key".to_string(), key),
        ("value".to_string(), value),
    ])))
}

/// Parse a `"KEYTYPE VALUETYPE"` string into a [`KeyValueSchema`].
pub fn parse_key_value_types(types: &str) -> Result<KeyValueSchema, SchemaError> {
    let cleaned = types.replace(',', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(SchemaError::Malformed(types.to_string()));
    }

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() != 2 {
        return Err(SchemaError::Malformed(types.to_string()));
    }

    Ok(KeyValueSchema::new(
        parse_type(tokens[0])?,
        parse_type(tokens[1])?,
    ))
}

fn parse_type(token: &str) -> Result<Schema, SchemaError> {
    if let Some(inner) = strip_wrapper(token, "arrayType(") {
        return Ok(Schema::Array(Box::new(parse_type(inner)?)));
    }
    if token == "object" {
        return Ok(Schema::Opaque("byte[]".to_string()));
    }
    if let Some(inner) = strip_wrapper(token, "object(") {
        return Ok(Schema::Opaque(inner.to_string()));
    }
    Primitive::from_name(token)
        .map(Schema::Primitive)
        .ok_or_else(|| SchemaError::UnknownPrimitive(token.to_string()))
}

fn strip_wrapper<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    token
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(')'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_pair() {
        let kv = parse_key_value_types("int string").unwrap();
        assert_eq!(kv.key, Schema::Primitive(Primitive::Int));
        assert_eq!(kv.value, Schema::Primitive(Primitive::String));
    }

    #[test]
    fn commas_are_stripped() {
        let kv = parse_key_value_types("string, long").unwrap();
        assert_eq!(kv.value, Schema::Primitive(Primitive::Long));
    }

    #[test]
    fn parses_array_and_object_tokens() {
        let kv = parse_key_value_types("arrayType(double) object(byte[])").unwrap();
        assert_eq!(
            kv.key,
            Schema::Array(Box::new(Schema::Primitive(Primitive::Double)))
        );
        assert_eq!(kv.value, Schema::Opaque("byte[]".to_string()));
    }

    #[test]
    fn bare_object_is_byte_array_payload() {
        let kv = parse_key_value_types("nil object").unwrap();
        assert_eq!(kv.value, Schema::Opaque("byte[]".to_string()));
    }

    #[test]
    fn nested_arrays_parse() {
        let kv = parse_key_value_types("string arrayType(arrayType(int))").unwrap();
        assert_eq!(
            kv.value,
            Schema::Array(Box::new(Schema::Array(Box::new(Schema::Primitive(
                Primitive::Int
            )))))
        );
    }

    #[test]
    fn wrong_arity_is_malformed() {
        assert!(matches!(
            parse_key_value_types("int"),
            Err(SchemaError::Malformed(_))
        ));
        assert!(matches!(
            parse_key_value_types("int string long"),
            Err(SchemaError::Malformed(_))
        ));
        assert!(matches!(
            parse_key_value_types("   "),
            Err(SchemaError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_primitive_is_rejected() {
        assert_eq!(
            parse_key_value_types("int wibble"),
            Err(SchemaError::UnknownPrimitive("wibble".to_string()))
        );
    }

    #[test]
    fn display_parse_round_trip_is_idempotent() {
        for input in [
            "int string",
            "string long",
            "nil object",
            "arrayType(double) object(byte[])",
            "string arrayType(arrayType(int))",
            "double nil",
        ] {
            let once = parse_key_value_types(input).unwrap();
            let twice = parse_key_value_types(&once.to_string()).unwrap();
            assert_eq!(once, twice, "round trip failed for '{input}'");
        }
    }

    #[test]
    fn wire_shape_is_array_of_key_value_records() {
        let kv = parse_key_value_types("int string").unwrap();
        let Schema::Array(element) = kv.wire_shape() else {
            panic!("wire shape must be an array");
        };
        let Schema::Record(fields) = *element else {
            panic!("wire element must be a record");
        };
        assert_eq!(fields[0].0, "key");
        assert_eq!(fields[1].0, "value");
    }
}
