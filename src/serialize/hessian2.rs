//! Hessian 2.0 serialization, the default body encoding of Java Dubbo peers.
//!
//! The writer emits the compact forms of the Hessian 2.0 grammar and never emits value
//! references. The reader accepts the whole grammar a Java peer produces for the
//! [`Value`] model: compact and chunked strings and binaries, typed and untyped lists and
//! maps, class definitions with object instances, and back references.

use super::error::{Result, SerializationError};
use super::traits::{ObjectInput, ObjectOutput, Serializer};
use super::HESSIAN2_SERIALIZATION_ID;
use crate::value::{Object, Value};

const MAX_DEPTH: usize = 256;
/// Values a body may decode to beyond one per input byte, spent by back references.
const MAX_REF_VALUES: usize = 1 << 20;
/// Largest chunk for strings (UTF-16 units) and binaries (bytes).
const CHUNK_SIZE: usize = 0x8000;

const BC_NULL: u8 = b'N';
const BC_TRUE: u8 = b'T';
const BC_FALSE: u8 = b'F';
const BC_INT: u8 = b'I';
const BC_LONG: u8 = b'L';
const BC_LONG_INT: u8 = 0x59;
const BC_DOUBLE: u8 = b'D';
const BC_DOUBLE_ZERO: u8 = 0x5b;
const BC_DOUBLE_ONE: u8 = 0x5c;
const BC_DOUBLE_BYTE: u8 = 0x5d;
const BC_DOUBLE_SHORT: u8 = 0x5e;
const BC_DOUBLE_MILL: u8 = 0x5f;
const BC_DATE: u8 = 0x4a;
const BC_DATE_MINUTE: u8 = 0x4b;
const BC_STRING: u8 = b'S';
const BC_STRING_CHUNK: u8 = b'R';
const BC_BINARY: u8 = b'B';
const BC_BINARY_CHUNK: u8 = b'A';
const BC_LIST_VARIABLE: u8 = 0x55;
const BC_LIST_FIXED: u8 = b'V';
const BC_LIST_VARIABLE_UNTYPED: u8 = 0x57;
const BC_LIST_FIXED_UNTYPED: u8 = 0x58;
const BC_LIST_DIRECT: u8 = 0x70;
const BC_LIST_DIRECT_UNTYPED: u8 = 0x78;
const LIST_DIRECT_MAX: usize = 0x07;
const BC_MAP: u8 = b'M';
const BC_MAP_UNTYPED: u8 = b'H';
const BC_END: u8 = b'Z';
const BC_OBJECT_DEF: u8 = b'C';
const BC_OBJECT: u8 = b'O';
const BC_OBJECT_DIRECT: u8 = 0x60;
const OBJECT_DIRECT_MAX: usize = 0x0f;
const BC_REF: u8 = 0x51;

const INT_DIRECT_MIN: i32 = -0x10;
const INT_DIRECT_MAX: i32 = 0x2f;
const BC_INT_ZERO: i32 = 0x90;
const INT_BYTE_MIN: i32 = -0x800;
const INT_BYTE_MAX: i32 = 0x7ff;
const BC_INT_BYTE_ZERO: i32 = 0xc8;
const INT_SHORT_MIN: i32 = -0x40000;
const INT_SHORT_MAX: i32 = 0x3ffff;
const BC_INT_SHORT_ZERO: i32 = 0xd4;

const LONG_DIRECT_MIN: i64 = -0x08;
const LONG_DIRECT_MAX: i64 = 0x0f;
const BC_LONG_ZERO: i64 = 0xe0;
const LONG_BYTE_MIN: i64 = -0x800;
const LONG_BYTE_MAX: i64 = 0x7ff;
const BC_LONG_BYTE_ZERO: i64 = 0xf8;
const LONG_SHORT_MIN: i64 = -0x40000;
const LONG_SHORT_MAX: i64 = 0x3ffff;
const BC_LONG_SHORT_ZERO: i64 = 0x3c;

const STRING_DIRECT_MAX: usize = 0x1f;
const STRING_SHORT_MAX: usize = 0x3ff;
const BC_STRING_SHORT: u8 = 0x30;
const BINARY_DIRECT_MAX: usize = 0x0f;
const BC_BINARY_DIRECT: u8 = 0x20;
const BINARY_SHORT_MAX: usize = 0x3ff;
const BC_BINARY_SHORT: u8 = 0x34;

#[derive(Debug, Clone, Copy, Default)]
pub struct Hessian2Serializer;

impl Serializer for Hessian2Serializer {
    fn id(&self) -> u8 {
        HESSIAN2_SERIALIZATION_ID
    }

    fn name(&self) -> &'static str {
        "hessian2"
    }

    fn output<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a> {
        Box::new(Hessian2Output::new(buf))
    }

    fn input<'a>(&self, data: &'a [u8]) -> Box<dyn ObjectInput + 'a> {
        Box::new(Hessian2Input::new(data))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ClassDef {
    name: String,
    fields: Vec<String>,
}

pub struct Hessian2Output<'a> {
    buf: &'a mut Vec<u8>,
    classes: Vec<ClassDef>,
}

impl<'a> Hessian2Output<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Hessian2Output {
            buf,
            classes: Vec::new(),
        }
    }

    fn write_value_at(&mut self, value: &Value, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(SerializationError::TooDeep(MAX_DEPTH));
        }
        match value {
            Value::Null => self.buf.push(BC_NULL),
            Value::Bool(true) => self.buf.push(BC_TRUE),
            Value::Bool(false) => self.buf.push(BC_FALSE),
            Value::Int(i) => self.put_int(*i),
            Value::Long(l) => self.put_long(*l),
            Value::Double(d) => self.put_double(*d),
            Value::String(s) => self.put_string(s),
            Value::Binary(b) => self.put_binary(b),
            Value::Date(ms) => {
                self.buf.push(BC_DATE);
                self.buf.extend_from_slice(&ms.to_be_bytes());
            }
            Value::List(items) => {
                if items.len() <= LIST_DIRECT_MAX {
                    self.buf.push(BC_LIST_DIRECT_UNTYPED + items.len() as u8);
                } else {
                    let len = i32::try_from(items.len()).map_err(|_| {
                        SerializationError::Unsupported(format!("list of {} items", items.len()))
                    })?;
                    self.buf.push(BC_LIST_FIXED_UNTYPED);
                    self.put_int(len);
                }
                for item in items {
                    self.write_value_at(item, depth + 1)?;
                }
            }
            Value::Map(entries) => {
                self.buf.push(BC_MAP_UNTYPED);
                for (k, v) in entries {
                    self.write_value_at(k, depth + 1)?;
                    self.write_value_at(v, depth + 1)?;
                }
                self.buf.push(BC_END);
            }
            Value::Object(obj) => self.put_object(obj, depth)?,
        }
        Ok(())
    }

    fn put_int(&mut self, v: i32) {
        if (INT_DIRECT_MIN..=INT_DIRECT_MAX).contains(&v) {
            self.buf.push((v + BC_INT_ZERO) as u8);
        } else if (INT_BYTE_MIN..=INT_BYTE_MAX).contains(&v) {
            self.buf.push((BC_INT_BYTE_ZERO + (v >> 8)) as u8);
            self.buf.push(v as u8);
        } else if (INT_SHORT_MIN..=INT_SHORT_MAX).contains(&v) {
            self.buf.push((BC_INT_SHORT_ZERO + (v >> 16)) as u8);
            self.buf.push((v >> 8) as u8);
            self.buf.push(v as u8);
        } else {
            self.buf.push(BC_INT);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn put_long(&mut self, v: i64) {
        if (LONG_DIRECT_MIN..=LONG_DIRECT_MAX).contains(&v) {
            self.buf.push((v + BC_LONG_ZERO) as u8);
        } else if (LONG_BYTE_MIN..=LONG_BYTE_MAX).contains(&v) {
            self.buf.push((BC_LONG_BYTE_ZERO + (v >> 8)) as u8);
            self.buf.push(v as u8);
        } else if (LONG_SHORT_MIN..=LONG_SHORT_MAX).contains(&v) {
            self.buf.push((BC_LONG_SHORT_ZERO + (v >> 16)) as u8);
            self.buf.push((v >> 8) as u8);
            self.buf.push(v as u8);
        } else if let Ok(i) = i32::try_from(v) {
            self.buf.push(BC_LONG_INT);
            self.buf.extend_from_slice(&i.to_be_bytes());
        } else {
            self.buf.push(BC_LONG);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn put_double(&mut self, v: f64) {
        // -0.0 keeps its sign only in the full form
        let negative_zero = v == 0.0 && v.is_sign_negative();
        if !negative_zero && v == 0.0 {
            self.buf.push(BC_DOUBLE_ZERO);
        } else if v == 1.0 {
            self.buf.push(BC_DOUBLE_ONE);
        } else if !negative_zero && (v as i8) as f64 == v {
            self.buf.push(BC_DOUBLE_BYTE);
            self.buf.push(v as i8 as u8);
        } else if !negative_zero && (v as i16) as f64 == v {
            self.buf.push(BC_DOUBLE_SHORT);
            self.buf.extend_from_slice(&(v as i16).to_be_bytes());
        } else {
            self.buf.push(BC_DOUBLE);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    /// Lengths count UTF-16 units and characters are written the way the JVM does it,
    /// surrogate halves as separate three-byte sequences.
    fn put_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        if units.is_empty() {
            self.buf.push(0x00);
            return;
        }

        let mut chunks = units.chunks(CHUNK_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            let len = chunk.len();
            if chunks.peek().is_some() {
                self.buf.push(BC_STRING_CHUNK);
                self.buf.extend_from_slice(&(len as u16).to_be_bytes());
            } else if len <= STRING_DIRECT_MAX {
                self.buf.push(len as u8);
            } else if len <= STRING_SHORT_MAX {
                self.buf.push(BC_STRING_SHORT + (len >> 8) as u8);
                self.buf.push(len as u8);
            } else {
                self.buf.push(BC_STRING);
                self.buf.extend_from_slice(&(len as u16).to_be_bytes());
            }
            for &unit in chunk {
                self.put_utf16_unit(unit);
            }
        }
    }

    fn put_utf16_unit(&mut self, unit: u16) {
        if unit < 0x80 {
            self.buf.push(unit as u8);
        } else if unit < 0x800 {
            self.buf.push(0xc0 | (unit >> 6) as u8);
            self.buf.push(0x80 | (unit & 0x3f) as u8);
        } else {
            self.buf.push(0xe0 | (unit >> 12) as u8);
            self.buf.push(0x80 | ((unit >> 6) & 0x3f) as u8);
            self.buf.push(0x80 | (unit & 0x3f) as u8);
        }
    }

    fn put_binary(&mut self, b: &[u8]) {
        if b.is_empty() {
            self.buf.push(BC_BINARY_DIRECT);
            return;
        }

        let mut chunks = b.chunks(CHUNK_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            let len = chunk.len();
            if chunks.peek().is_some() {
                self.buf.push(BC_BINARY_CHUNK);
                self.buf.extend_from_slice(&(len as u16).to_be_bytes());
            } else if len <= BINARY_DIRECT_MAX {
                self.buf.push(BC_BINARY_DIRECT + len as u8);
            } else if len <= BINARY_SHORT_MAX {
                self.buf.push(BC_BINARY_SHORT + (len >> 8) as u8);
                self.buf.push(len as u8);
            } else {
                self.buf.push(BC_BINARY);
                self.buf.extend_from_slice(&(len as u16).to_be_bytes());
            }
            self.buf.extend_from_slice(chunk);
        }
    }

    fn put_object(&mut self, obj: &Object, depth: usize) -> Result<()> {
        let def = ClassDef {
            name: obj.class.clone(),
            fields: obj.fields.iter().map(|(name, _)| name.clone()).collect(),
        };
        let index = match self.classes.iter().position(|c| *c == def) {
            Some(index) => index,
            None => {
                self.buf.push(BC_OBJECT_DEF);
                self.put_string(&def.name);
                let count = i32::try_from(def.fields.len()).map_err(|_| {
                    SerializationError::Unsupported(format!(
                        "class {} with {} fields",
                        def.name,
                        def.fields.len()
                    ))
                })?;
                self.put_int(count);
                for field in &def.fields {
                    self.put_string(field);
                }
                self.classes.push(def);
                self.classes.len() - 1
            }
        };

        if index <= OBJECT_DIRECT_MAX {
            self.buf.push(BC_OBJECT_DIRECT + index as u8);
        } else {
            let index = i32::try_from(index).map_err(|_| {
                SerializationError::Unsupported(format!("class index {}", index))
            })?;
            self.buf.push(BC_OBJECT);
            self.put_int(index);
        }
        for (_, value) in &obj.fields {
            self.write_value_at(value, depth + 1)?;
        }
        Ok(())
    }
}

impl ObjectOutput for Hessian2Output<'_> {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        self.write_value_at(value, 0)
    }
}

pub struct Hessian2Input<'a> {
    data: &'a [u8],
    pos: usize,
    classes: Vec<ClassDef>,
    types: Vec<String>,
    /// One slot per list, map and object, in the order they started, with the number
    /// of values it took to decode.
    refs: Vec<Option<(Value, usize)>>,
    /// Values decoded so far, references counted at their full size.
    decoded: usize,
    budget: usize,
}

impl<'a> Hessian2Input<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Hessian2Input {
            data,
            pos: 0,
            classes: Vec::new(),
            types: Vec::new(),
            refs: Vec::new(),
            decoded: 0,
            budget: data.len().saturating_add(MAX_REF_VALUES),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(SerializationError::UnexpectedEof(self.pos))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(SerializationError::UnexpectedEof(self.data.len()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn count_values(&mut self, n: usize) -> Result<()> {
        self.decoded = self.decoded.saturating_add(n);
        if self.decoded > self.budget {
            return Err(SerializationError::TooManyValues(self.budget));
        }
        Ok(())
    }

    fn read_value_at(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(SerializationError::TooDeep(MAX_DEPTH));
        }
        self.count_values(1)?;
        let offset = self.pos;
        let tag = self.read_u8()?;
        let value = match tag {
            BC_NULL => Value::Null,
            BC_TRUE => Value::Bool(true),
            BC_FALSE => Value::Bool(false),

            0x80..=0xbf | 0xc0..=0xcf | 0xd0..=0xd7 | BC_INT => Value::Int(self.int_body(tag)?),
            0xd8..=0xef | 0xf0..=0xff | 0x38..=0x3f | BC_LONG_INT | BC_LONG => {
                Value::Long(self.long_body(tag)?)
            }

            BC_DOUBLE_ZERO => Value::Double(0.0),
            BC_DOUBLE_ONE => Value::Double(1.0),
            BC_DOUBLE_BYTE => Value::Double(self.read_u8()? as i8 as f64),
            BC_DOUBLE_SHORT => Value::Double(i16::from_be_bytes(self.read_array()?) as f64),
            BC_DOUBLE_MILL => {
                Value::Double(i32::from_be_bytes(self.read_array()?) as f64 * 0.001)
            }
            BC_DOUBLE => Value::Double(f64::from_be_bytes(self.read_array()?)),

            BC_DATE => Value::Date(i64::from_be_bytes(self.read_array()?)),
            BC_DATE_MINUTE => {
                Value::Date(i32::from_be_bytes(self.read_array()?) as i64 * 60_000)
            }

            0x00..=0x1f | 0x30..=0x33 | BC_STRING | BC_STRING_CHUNK => {
                Value::String(self.string_body(tag)?)
            }
            0x20..=0x2f | 0x34..=0x37 | BC_BINARY | BC_BINARY_CHUNK => {
                Value::Binary(self.binary_body(tag)?)
            }

            BC_LIST_VARIABLE => {
                self.read_type()?;
                self.list_until_end(depth)?
            }
            BC_LIST_VARIABLE_UNTYPED => self.list_until_end(depth)?,
            BC_LIST_FIXED => {
                self.read_type()?;
                let len = self.read_length()?;
                self.list_fixed(len, depth)?
            }
            BC_LIST_FIXED_UNTYPED => {
                let len = self.read_length()?;
                self.list_fixed(len, depth)?
            }
            0x70..=0x77 => {
                self.read_type()?;
                self.list_fixed((tag - BC_LIST_DIRECT) as usize, depth)?
            }
            0x78..=0x7f => self.list_fixed((tag - BC_LIST_DIRECT_UNTYPED) as usize, depth)?,

            BC_MAP => {
                self.read_type()?;
                self.map_until_end(depth)?
            }
            BC_MAP_UNTYPED => self.map_until_end(depth)?,

            BC_OBJECT_DEF => {
                self.read_class_def()?;
                return self.read_value_at(depth + 1);
            }
            BC_OBJECT => {
                let index = self.read_length()?;
                self.object_body(index, depth)?
            }
            0x60..=0x6f => self.object_body((tag - BC_OBJECT_DIRECT) as usize, depth)?,

            BC_REF => {
                let index = self.read_length()?;
                let weight = match self.refs.get(index) {
                    Some(Some((_, weight))) => *weight,
                    _ => return Err(SerializationError::InvalidReference(index)),
                };
                // charged before the copy is made
                self.count_values(weight)?;
                match self.refs.get(index) {
                    Some(Some((value, _))) => value.clone(),
                    _ => return Err(SerializationError::InvalidReference(index)),
                }
            }

            _ => return Err(SerializationError::UnknownTag { tag, offset }),
        };
        Ok(value)
    }

    fn int_body(&mut self, tag: u8) -> Result<i32> {
        let t = tag as i32;
        Ok(match tag {
            0x80..=0xbf => t - BC_INT_ZERO,
            0xc0..=0xcf => ((t - BC_INT_BYTE_ZERO) << 8) + self.read_u8()? as i32,
            0xd0..=0xd7 => {
                let [b1, b2]: [u8; 2] = self.read_array()?;
                ((t - BC_INT_SHORT_ZERO) << 16) + ((b1 as i32) << 8) + b2 as i32
            }
            _ => i32::from_be_bytes(self.read_array()?),
        })
    }

    fn long_body(&mut self, tag: u8) -> Result<i64> {
        let t = tag as i64;
        Ok(match tag {
            0xd8..=0xef => t - BC_LONG_ZERO,
            0xf0..=0xff => ((t - BC_LONG_BYTE_ZERO) << 8) + self.read_u8()? as i64,
            0x38..=0x3f => {
                let [b1, b2]: [u8; 2] = self.read_array()?;
                ((t - BC_LONG_SHORT_ZERO) << 16) + ((b1 as i64) << 8) + b2 as i64
            }
            BC_LONG_INT => i32::from_be_bytes(self.read_array()?) as i64,
            _ => i64::from_be_bytes(self.read_array()?),
        })
    }

    /// Non-negative int used as a length or index.
    fn read_length(&mut self) -> Result<usize> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        let i = match tag {
            0x80..=0xd7 | BC_INT => self.int_body(tag)?,
            _ => return Err(SerializationError::UnknownTag { tag, offset }),
        };
        usize::try_from(i)
            .map_err(|_| SerializationError::Unsupported(format!("negative length {}", i)))
    }

    /// A string in a class definition, where nothing else may appear.
    fn read_plain_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        match tag {
            0x00..=0x1f | 0x30..=0x33 | BC_STRING | BC_STRING_CHUNK => self.string_body(tag),
            _ => Err(SerializationError::UnknownTag { tag, offset }),
        }
    }

    fn string_body(&mut self, mut tag: u8) -> Result<String> {
        let start = self.pos;
        let mut units = Vec::new();
        loop {
            let (len, last) = match tag {
                0x00..=0x1f => (tag as usize, true),
                0x30..=0x33 => {
                    let low = self.read_u8()? as usize;
                    ((((tag - BC_STRING_SHORT) as usize) << 8) + low, true)
                }
                BC_STRING => (u16::from_be_bytes(self.read_array()?) as usize, true),
                BC_STRING_CHUNK => (u16::from_be_bytes(self.read_array()?) as usize, false),
                _ => {
                    return Err(SerializationError::UnknownTag {
                        tag,
                        offset: self.pos - 1,
                    });
                }
            };
            self.read_utf16_units(len, &mut units)?;
            if last {
                break;
            }
            tag = self.read_u8()?;
        }
        String::from_utf16(&units).map_err(|_| SerializationError::InvalidUtf8(start))
    }

    fn read_utf16_units(&mut self, count: usize, out: &mut Vec<u16>) -> Result<()> {
        let mut read = 0;
        while read < count {
            let offset = self.pos;
            let b = self.read_u8()? as u32;
            let unit = if b < 0x80 {
                b
            } else if b & 0xe0 == 0xc0 {
                ((b & 0x1f) << 6) | self.continuation(offset)?
            } else if b & 0xf0 == 0xe0 {
                let c1 = self.continuation(offset)?;
                let c2 = self.continuation(offset)?;
                ((b & 0x0f) << 12) | (c1 << 6) | c2
            } else if b & 0xf8 == 0xf0 {
                // four-byte UTF-8 from non-JVM writers, counted as a surrogate pair
                let c1 = self.continuation(offset)?;
                let c2 = self.continuation(offset)?;
                let c3 = self.continuation(offset)?;
                let cp = ((b & 0x07) << 18) | (c1 << 12) | (c2 << 6) | c3;
                let ch = char::from_u32(cp).ok_or(SerializationError::InvalidUtf8(offset))?;
                let mut pair = [0u16; 2];
                out.extend_from_slice(ch.encode_utf16(&mut pair));
                read += 2;
                continue;
            } else {
                return Err(SerializationError::InvalidUtf8(offset));
            };
            out.push(unit as u16);
            read += 1;
        }
        Ok(())
    }

    fn continuation(&mut self, offset: usize) -> Result<u32> {
        let b = self.read_u8()?;
        if b & 0xc0 != 0x80 {
            return Err(SerializationError::InvalidUtf8(offset));
        }
        Ok((b & 0x3f) as u32)
    }

    fn binary_body(&mut self, mut tag: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let (len, last) = match tag {
                0x20..=0x2f => ((tag - BC_BINARY_DIRECT) as usize, true),
                0x34..=0x37 => {
                    let low = self.read_u8()? as usize;
                    ((((tag - BC_BINARY_SHORT) as usize) << 8) + low, true)
                }
                BC_BINARY => (u16::from_be_bytes(self.read_array()?) as usize, true),
                BC_BINARY_CHUNK => (u16::from_be_bytes(self.read_array()?) as usize, false),
                _ => {
                    return Err(SerializationError::UnknownTag {
                        tag,
                        offset: self.pos - 1,
                    });
                }
            };
            out.extend_from_slice(self.read_bytes(len)?);
            if last {
                break;
            }
            tag = self.read_u8()?;
        }
        Ok(out)
    }

    /// Reads a list or map type, either a name or an index into the names seen so far.
    fn read_type(&mut self) -> Result<String> {
        let tag = self.peek_u8()?;
        match tag {
            0x00..=0x1f | 0x30..=0x33 | BC_STRING | BC_STRING_CHUNK => {
                self.pos += 1;
                let name = self.string_body(tag)?;
                self.types.push(name.clone());
                Ok(name)
            }
            _ => {
                let index = self.read_length()?;
                self.types
                    .get(index)
                    .cloned()
                    .ok_or(SerializationError::InvalidReference(index))
            }
        }
    }

    /// Returns the slot and the value count at which the container started.
    fn reserve_ref(&mut self) -> (usize, usize) {
        self.refs.push(None);
        (self.refs.len() - 1, self.decoded)
    }

    fn fill_ref(&mut self, (slot, start): (usize, usize), value: Value) -> Value {
        // the container's own tag was counted before it reserved its slot
        let weight = self.decoded - start + 1;
        self.refs[slot] = Some((value.clone(), weight));
        value
    }

    fn list_fixed(&mut self, len: usize, depth: usize) -> Result<Value> {
        let slot = self.reserve_ref();
        // a hostile length must not drive the allocation
        let mut items = Vec::with_capacity(len.min(self.data.len() - self.pos));
        for _ in 0..len {
            items.push(self.read_value_at(depth + 1)?);
        }
        Ok(self.fill_ref(slot, Value::List(items)))
    }

    fn list_until_end(&mut self, depth: usize) -> Result<Value> {
        let slot = self.reserve_ref();
        let mut items = Vec::new();
        while self.peek_u8()? != BC_END {
            items.push(self.read_value_at(depth + 1)?);
        }
        self.pos += 1;
        Ok(self.fill_ref(slot, Value::List(items)))
    }

    fn map_until_end(&mut self, depth: usize) -> Result<Value> {
        let slot = self.reserve_ref();
        let mut entries = Vec::new();
        while self.peek_u8()? != BC_END {
            let key = self.read_value_at(depth + 1)?;
            let value = self.read_value_at(depth + 1)?;
            entries.push((key, value));
        }
        self.pos += 1;
        Ok(self.fill_ref(slot, Value::Map(entries)))
    }

    fn read_class_def(&mut self) -> Result<()> {
        let name = self.read_plain_string()?;
        let count = self.read_length()?;
        let mut fields = Vec::with_capacity(count.min(self.data.len() - self.pos));
        for _ in 0..count {
            fields.push(self.read_plain_string()?);
        }
        self.classes.push(ClassDef { name, fields });
        Ok(())
    }

    fn object_body(&mut self, index: usize, depth: usize) -> Result<Value> {
        let def = self
            .classes
            .get(index)
            .cloned()
            .ok_or(SerializationError::InvalidReference(index))?;
        let slot = self.reserve_ref();
        let mut obj = Object::new(def.name);
        for field in def.fields {
            let value = self.read_value_at(depth + 1)?;
            obj.fields.push((field, value));
        }
        Ok(self.fill_ref(slot, Value::Object(obj)))
    }
}

impl ObjectInput for Hessian2Input<'_> {
    fn read_value(&mut self) -> Result<Value> {
        self.read_value_at(0)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}
