//! Language-level values carried in Dubbo bodies.
//!
//! A [`Value`] is what a [`Serializer`](crate::serialize::Serializer) reads and writes. The
//! set mirrors what a Java peer can express through Hessian 2: scalars, strings, binary
//! blobs, dates, lists, maps and named objects.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    List(Vec<Value>),
    /// Entries in wire order. Keys are not restricted to strings.
    Map(Vec<(Value, Value)>),
    Object(Object),
}

/// A named object: Java class name plus its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: String,
    pub fields: Vec<(String, Value)>,
}

impl Object {
    pub fn new(class: impl Into<String>) -> Self {
        Object {
            class: class.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    /// JVM type descriptor of the parameter this value stands for.
    pub fn type_descriptor(&self) -> String {
        match self {
            Value::Null => "V".to_string(),
            Value::Bool(_) => "Z".to_string(),
            Value::Int(_) => "I".to_string(),
            Value::Long(_) => "J".to_string(),
            Value::Double(_) => "D".to_string(),
            Value::String(_) => "Ljava/lang/String;".to_string(),
            Value::Binary(_) => "[B".to_string(),
            Value::Date(_) => "Ljava/util/Date;".to_string(),
            Value::List(_) => "Ljava/util/List;".to_string(),
            Value::Map(_) => "Ljava/util/Map;".to_string(),
            Value::Object(obj) => format!("L{};", obj.class.replace('.', "/")),
        }
    }

    /// Builds a map value from string pairs, keeping iteration order.
    pub fn string_map<'a, I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}L", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(ms) => write!(f, "Date({})", ms),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "{}({} fields)", obj.class, obj.fields.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

/// Concatenated descriptors of `args`, e.g. `Ljava/lang/String;I`.
pub fn parameter_descriptor(args: &[Value]) -> String {
    args.iter().map(Value::type_descriptor).collect()
}

/// Splits a concatenated descriptor into one entry per parameter.
///
/// Returns `None` when the descriptor is not well formed.
pub fn split_descriptor(desc: &str) -> Option<Vec<&str>> {
    let bytes = desc.as_bytes();
    let mut types = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        while bytes[i] == b'[' {
            i += 1;
            if i >= bytes.len() {
                return None;
            }
        }
        match bytes[i] {
            b'V' | b'Z' | b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' => i += 1,
            b'L' => {
                let end = desc[i..].find(';')?;
                if end == 1 {
                    return None;
                }
                i += end + 1;
            }
            _ => return None,
        }
        types.push(&desc[start..i]);
    }

    Some(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_args() {
        let args = vec![
            Value::from("a"),
            Value::Int(1),
            Value::Long(2),
            Value::Binary(vec![1, 2]),
            Value::Object(Object::new("com.example.User")),
        ];
        assert_eq!(
            parameter_descriptor(&args),
            "Ljava/lang/String;IJ[BLcom/example/User;"
        );
        assert_eq!(parameter_descriptor(&[]), "");
    }

    #[test]
    fn test_split_descriptor() {
        let types = split_descriptor("Ljava/lang/String;[[IJLjava/util/Map;Z").unwrap();
        assert_eq!(
            types,
            vec!["Ljava/lang/String;", "[[I", "J", "Ljava/util/Map;", "Z"]
        );
        assert_eq!(split_descriptor("").unwrap().len(), 0);
    }

    #[test]
    fn test_split_descriptor_rejects_garbage() {
        assert!(split_descriptor("Ljava/lang/String").is_none());
        assert!(split_descriptor("[").is_none());
        assert!(split_descriptor("Q").is_none());
        assert!(split_descriptor("L;").is_none());
    }

    #[test]
    fn test_object_field_lookup() {
        let obj = Object::new("java.lang.Exception").with_field("detailMessage", "boom");
        assert_eq!(obj.field("detailMessage").and_then(Value::as_str), Some("boom"));
        assert!(obj.field("cause").is_none());
    }
}
