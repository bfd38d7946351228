use super::error::{Result, SerializationError};
use crate::value::Value;
use std::fmt;

/// A body serialization format, selected per packet by its one-byte id.
///
/// Implementations hand out a fresh writer or reader per body, so stateful formats can
/// keep class definitions and references scoped to one packet.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Identifier carried in the low five bits of the header flag byte.
    fn id(&self) -> u8;

    fn name(&self) -> &'static str;

    fn output<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a>;

    fn input<'a>(&self, data: &'a [u8]) -> Box<dyn ObjectInput + 'a>;
}

/// Sequential writer of values into one body.
pub trait ObjectOutput {
    fn write_value(&mut self, value: &Value) -> Result<()>;

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_value(&Value::String(s.to_string()))
    }

    fn write_int(&mut self, i: i32) -> Result<()> {
        self.write_value(&Value::Int(i))
    }
}

/// Sequential reader of values out of one body.
pub trait ObjectInput {
    fn read_value(&mut self) -> Result<Value>;

    /// True once every byte of the body has been consumed.
    fn is_empty(&self) -> bool;

    /// Reads a string element; a serialized null reads as the empty string.
    fn read_string(&mut self) -> Result<String> {
        match self.read_value()? {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(SerializationError::UnexpectedType {
                expected: "string",
                found: other.kind_name(),
            }),
        }
    }

    fn read_int(&mut self) -> Result<i32> {
        match self.read_value()? {
            Value::Int(i) => Ok(i),
            Value::Long(l) => i32::try_from(l).map_err(|_| SerializationError::UnexpectedType {
                expected: "int",
                found: "long",
            }),
            other => Err(SerializationError::UnexpectedType {
                expected: "int",
                found: other.kind_name(),
            }),
        }
    }
}
