//! Record values that flow between the orchestration driver and stub workers.

use serde::{Deserialize, Serialize};

use crate::types::{Primitive, Schema};

/// One runtime token. The variants mirror [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Str(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Array(Vec<Value>),
    Record(Vec<(String, Value)>),
    Opaque(Vec<u8>),
}

impl Value {
    /// Structural conformance check against a declared schema.
    ///
    /// `Nil` conforms to anything (it is the sentinel key for keyless
    /// formats), and any value conforms to a `nil` schema slot.
    pub fn conforms_to(&self, schema: &Schema) -> bool {
        match (self, schema) {
            (Value::Nil, _) | (_, Schema::Primitive(Primitive::Nil)) => true,
            (Value::Str(_), Schema::Primitive(Primitive::String)) => true,
            (Value::Int(_), Schema::Primitive(Primitive::Int)) => true,
            (Value::Long(_), Schema::Primitive(Primitive::Long)) => true,
            (Value::Double(_), Schema::Primitive(Primitive::Double)) => true,
            (Value::Array(items), Schema::Array(element)) => {
                items.iter().all(|v| v.conforms_to(element))
            }
            (Value::Record(fields), Schema::Record(field_schemas)) => {
                fields.len() == field_schemas.len()
                    && fields.iter().zip(field_schemas).all(|((n, v), (sn, sv))| {
                        n == sn && v.conforms_to(sv)
                    })
            }
            (Value::Opaque(_), Schema::Opaque(_)) => true,
            _ => false,
        }
    }
}

/// One key/value record on the wire between driver and stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Value,
    pub value: Value,
}

impl Record {
    pub fn new(key: Value, value: Value) -> Self {
        Self { key, value }
    }

    /// Keyless record used by formats that deliver raw values.
    pub fn keyless(value: Value) -> Self {
        Self {
            key: Value::Nil,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_key_value_types;

    #[test]
    fn conformance_follows_schema_structure() {
        let kv = parse_key_value_types("int arrayType(string)").unwrap();
        assert!(Value::Int(3).conforms_to(&kv.key));
        assert!(
            Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())])
                .conforms_to(&kv.value)
        );
        assert!(!Value::Str("3".into()).conforms_to(&kv.key));
        assert!(!Value::Array(vec![Value::Int(1)]).conforms_to(&kv.value));
    }

    #[test]
    fn nil_conforms_everywhere() {
        let kv = parse_key_value_types("nil string").unwrap();
        assert!(Value::Nil.conforms_to(&kv.key));
        assert!(Value::Long(9).conforms_to(&kv.key));
        assert!(Value::Nil.conforms_to(&kv.value));
    }
}
