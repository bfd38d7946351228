//! FastJson serialization: every value is one JSON document followed by a newline.
//!
//! JSON cannot tell every [`Value`] variant apart, so dates come back as numbers and
//! binaries as lists of ints.
//! Objects carry their class in an `@type` member, the way FastJson's auto-type does.

use super::error::{Result, SerializationError};
use super::traits::{ObjectInput, ObjectOutput, Serializer};
use super::FASTJSON_SERIALIZATION_ID;
use crate::value::{Object, Value};
use serde_json::{Map, Number, Value as Json};

const TYPE_KEY: &str = "@type";

#[derive(Debug, Clone, Copy, Default)]
pub struct FastJsonSerializer;

impl Serializer for FastJsonSerializer {
    fn id(&self) -> u8 {
        FASTJSON_SERIALIZATION_ID
    }

    fn name(&self) -> &'static str {
        "fastjson"
    }

    fn output<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a> {
        Box::new(FastJsonOutput { buf })
    }

    fn input<'a>(&self, data: &'a [u8]) -> Box<dyn ObjectInput + 'a> {
        Box::new(FastJsonInput { data, pos: 0 })
    }
}

struct FastJsonOutput<'a> {
    buf: &'a mut Vec<u8>,
}

impl ObjectOutput for FastJsonOutput<'_> {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        let json = to_json(value)?;
        serde_json::to_writer(&mut *self.buf, &json)?;
        self.buf.push(b'\n');
        Ok(())
    }
}

struct FastJsonInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl ObjectInput for FastJsonInput<'_> {
    fn read_value(&mut self) -> Result<Value> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return Err(SerializationError::UnexpectedEof(self.pos));
        }
        let line_len = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
        let json: Json = serde_json::from_slice(&rest[..line_len])?;
        // skip the newline as well, if there is one
        self.pos += (line_len + 1).min(rest.len());
        from_json(json)
    }

    fn is_empty(&self) -> bool {
        self.data[self.pos..].iter().all(|b| b.is_ascii_whitespace())
    }
}

fn to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Long(l) | Value::Date(l) => Json::from(*l),
        Value::Double(d) => Json::Number(
            Number::from_f64(*d)
                .ok_or_else(|| SerializationError::Unsupported(format!("non-finite double {}", d)))?,
        ),
        Value::String(s) => Json::String(s.clone()),
        Value::Binary(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect::<Result<_>>()?),
        Value::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match k {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(SerializationError::Unsupported(format!(
                            "JSON object key of type {}",
                            other.kind_name()
                        )));
                    }
                };
                map.insert(key, to_json(v)?);
            }
            Json::Object(map)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            map.insert(TYPE_KEY.to_string(), Json::String(obj.class.clone()));
            for (name, v) in &obj.fields {
                map.insert(name.clone(), to_json(v)?);
            }
            Json::Object(map)
        }
    })
}

fn from_json(json: Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::Long(i),
                }
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::List(items.into_iter().map(from_json).collect::<Result<_>>()?),
        Json::Object(map) => match map.get(TYPE_KEY) {
            Some(Json::String(class)) => {
                let mut obj = Object::new(class.clone());
                for (name, v) in map {
                    if name != TYPE_KEY {
                        obj.fields.push((name, from_json(v)?));
                    }
                }
                Value::Object(obj)
            }
            _ => object_to_map(map)?,
        },
    })
}

fn object_to_map(map: Map<String, Json>) -> Result<Value> {
    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in map {
        entries.push((Value::String(k), from_json(v)?));
    }
    Ok(Value::Map(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[Value]) -> Vec<Value> {
        let mut buf = Vec::new();
        {
            let mut out = FastJsonSerializer.output(&mut buf);
            for v in values {
                out.write_value(v).unwrap();
            }
        }
        let mut input = FastJsonSerializer.input(&buf);
        let mut decoded = Vec::new();
        while !input.is_empty() {
            decoded.push(input.read_value().unwrap());
        }
        decoded
    }

    #[test]
    fn test_values_are_newline_delimited() {
        let mut buf = Vec::new();
        {
            let mut out = FastJsonSerializer.output(&mut buf);
            out.write_str("2.0.2").unwrap();
            out.write_int(4).unwrap();
        }
        assert_eq!(buf, b"\"2.0.2\"\n4\n");
    }

    #[test]
    fn test_round_trip_keeps_common_values() {
        let values = vec![
            Value::from("path"),
            Value::Int(-3),
            Value::Long(1 << 40),
            Value::Double(2.5),
            Value::Bool(false),
            Value::Null,
            Value::List(vec![Value::from("a")]),
            Value::Map(vec![(Value::from("timeout"), Value::from("1000"))]),
        ];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn test_object_uses_type_member() {
        let ex = Value::Object(Object::new("java.lang.Exception").with_field("detailMessage", "boom"));
        assert_eq!(round_trip(&[ex.clone()]), vec![ex]);

        let user = Value::Object(
            Object::new("com.example.User")
                .with_field("name", "bob")
                .with_field("age", 3),
        );
        assert_eq!(round_trip(&[user.clone()]), vec![user]);
    }

    #[test]
    fn test_map_keeps_entry_order() {
        let map = Value::Map(vec![
            (Value::from("zone"), Value::from("b")),
            (Value::from("app"), Value::from("a")),
        ]);
        assert_eq!(round_trip(&[map.clone()]), vec![map]);
    }

    #[test]
    fn test_lossy_values_widen() {
        let decoded = round_trip(&[Value::Date(5), Value::Binary(vec![1, 2])]);
        assert_eq!(
            decoded,
            vec![
                Value::Int(5),
                Value::List(vec![Value::Int(1), Value::Int(2)])
            ]
        );
    }

    #[test]
    fn test_rejects_unrepresentable_values() {
        let mut buf = Vec::new();
        let mut out = FastJsonSerializer.output(&mut buf);
        assert!(matches!(
            out.write_value(&Value::Double(f64::NAN)),
            Err(SerializationError::Unsupported(_))
        ));
        assert!(matches!(
            out.write_value(&Value::Map(vec![(Value::Int(1), Value::Null)])),
            Err(SerializationError::Unsupported(_))
        ));
    }

    #[test]
    fn test_garbage_is_a_json_error() {
        let mut input = FastJsonSerializer.input(b"{not json\n");
        assert!(matches!(input.read_value(), Err(SerializationError::Json(_))));
    }
}
