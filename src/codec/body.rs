//! Type-specific body payloads and their encoding through a [`Serializer`].
//!
//! The body codec knows the element order of each packet kind and nothing about byte
//! formats; every element goes through the serializer picked by the header.

use super::error::BodyError;
use super::header::{Header, PacketKind, ResponseStatus};
use crate::config::DEFAULT_DUBBO_VERSION;
use crate::serialize::{ObjectInput, ObjectOutput, Serializer};
use crate::value::{self, Object, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub type Attachments = BTreeMap<String, String>;

pub const DUBBO_VERSION_KEY: &str = "dubbo";
pub const INTERFACE_KEY: &str = "interface";
pub const PATH_KEY: &str = "path";
pub const VERSION_KEY: &str = "version";
pub const GROUP_KEY: &str = "group";
pub const TIMEOUT_KEY: &str = "timeout";

const RESPONSE_WITH_EXCEPTION: i32 = 0;
const RESPONSE_VALUE: i32 = 1;
const RESPONSE_NULL_VALUE: i32 = 2;
const RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS: i32 = 3;
const RESPONSE_VALUE_WITH_ATTACHMENTS: i32 = 4;
const RESPONSE_NULL_VALUE_WITH_ATTACHMENTS: i32 = 5;

/// Oldest protocol version whose bodies always end with attachments.
const ATTACHMENTS_SINCE: [u32; 3] = [2, 0, 2];

/// The remote service and method a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Service {
    pub interface: String,
    pub path: String,
    pub version: String,
    pub group: Option<String>,
    pub method: String,
    pub timeout: Duration,
}

impl Service {
    pub fn new(interface: impl Into<String>, method: impl Into<String>) -> Self {
        let interface = interface.into();
        Service {
            path: interface.clone(),
            interface,
            method: method.into(),
            ..Service::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub dubbo_version: String,
    pub path: String,
    pub version: String,
    pub method: String,
    pub parameter_types: String,
    pub args: Vec<Value>,
    pub attachments: Attachments,
}

impl RequestBody {
    pub fn new(service: &Service, args: Vec<Value>) -> Self {
        Self::with_dubbo_version(DEFAULT_DUBBO_VERSION, service, args)
    }

    /// Builds a body for `service`, deriving the parameter descriptor from `args` and
    /// filling in the standard attachments.
    pub fn with_dubbo_version(dubbo_version: &str, service: &Service, args: Vec<Value>) -> Self {
        let mut attachments = Attachments::new();
        attachments.insert(DUBBO_VERSION_KEY.to_string(), dubbo_version.to_string());
        attachments.insert(INTERFACE_KEY.to_string(), service.interface.clone());
        attachments.insert(PATH_KEY.to_string(), service.path.clone());
        attachments.insert(VERSION_KEY.to_string(), service.version.clone());
        attachments.insert(TIMEOUT_KEY.to_string(), service.timeout.as_millis().to_string());
        if let Some(group) = &service.group {
            attachments.insert(GROUP_KEY.to_string(), group.clone());
        }

        RequestBody {
            dubbo_version: dubbo_version.to_string(),
            path: service.path.clone(),
            version: service.version.clone(),
            method: service.method.clone(),
            parameter_types: value::parameter_descriptor(&args),
            args,
            attachments,
        }
    }

    /// Replaces the derived descriptor, e.g. when an argument is a subtype.
    pub fn with_parameter_types(mut self, parameter_types: impl Into<String>) -> Self {
        self.parameter_types = parameter_types.into();
        self
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// The target service as far as the body and its attachments describe it.
    pub fn service(&self) -> Service {
        let interface = self
            .attachments
            .get(INTERFACE_KEY)
            .cloned()
            .unwrap_or_else(|| self.path.clone());
        let timeout = self
            .attachments
            .get(TIMEOUT_KEY)
            .and_then(|t| t.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_default();
        Service {
            interface,
            path: self.path.clone(),
            version: self.version.clone(),
            group: self.attachments.get(GROUP_KEY).cloned(),
            method: self.method.clone(),
            timeout,
        }
    }
}

/// A Java exception as it travels in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub class: String,
    pub message: String,
}

impl Exception {
    pub const DEFAULT_CLASS: &'static str = "java.lang.Exception";
    const MESSAGE_FIELD: &'static str = "detailMessage";

    pub fn new(message: impl Into<String>) -> Self {
        Exception {
            class: Self::DEFAULT_CLASS.to_string(),
            message: message.into(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    fn to_value(&self) -> Value {
        Value::Object(
            Object::new(self.class.clone()).with_field(Self::MESSAGE_FIELD, self.message.as_str()),
        )
    }

    fn from_value(value: Value) -> Result<Self, BodyError> {
        match value {
            Value::Object(obj) => {
                let message = obj
                    .field(Self::MESSAGE_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Exception {
                    class: obj.class,
                    message,
                })
            }
            Value::String(message) => Ok(Exception::new(message)),
            other => Err(BodyError::Malformed(format!(
                "exception encoded as {}",
                other.kind_name()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    /// A void method or a null return value.
    Null,
    Exception(Exception),
    /// Framework-level failure carried by a non-OK status.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBody {
    pub outcome: Outcome,
    pub attachments: Attachments,
}

impl ResponseBody {
    pub fn new(outcome: Outcome) -> Self {
        ResponseBody {
            outcome,
            attachments: Attachments::new(),
        }
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Request(RequestBody),
    Response(ResponseBody),
    Heartbeat,
}

/// Serializes `body` for a packet described by `header`.
pub fn encode_body(
    header: &Header,
    body: &Body,
    serializer: &dyn Serializer,
) -> Result<Vec<u8>, BodyError> {
    let kind = header
        .kind()
        .ok_or_else(|| BodyError::Inconsistent("package type names no packet kind".to_string()))?;
    let mut buf = Vec::new();

    match (kind, body) {
        (PacketKind::HeartbeatRequest | PacketKind::HeartbeatResponse, Body::Heartbeat) => {}
        (PacketKind::Request | PacketKind::RequestOneWay, Body::Request(req)) => {
            let mut out = serializer.output(&mut buf);
            encode_request(out.as_mut(), req)?;
        }
        (PacketKind::Response, Body::Response(resp)) => {
            let ok = header.status == ResponseStatus::Ok.as_u8();
            let mut out = serializer.output(&mut buf);
            encode_response(out.as_mut(), resp, ok)?;
        }
        (kind, body) => {
            return Err(BodyError::Inconsistent(format!(
                "{:?} packet cannot carry a {} body",
                kind,
                body_name(body)
            )));
        }
    }

    Ok(buf)
}

fn body_name(body: &Body) -> &'static str {
    match body {
        Body::Request(_) => "request",
        Body::Response(_) => "response",
        Body::Heartbeat => "heartbeat",
    }
}

fn encode_request(out: &mut dyn ObjectOutput, req: &RequestBody) -> Result<(), BodyError> {
    let declared = value::split_descriptor(&req.parameter_types).ok_or_else(|| {
        BodyError::Inconsistent(format!(
            "invalid parameter descriptor {:?}",
            req.parameter_types
        ))
    })?;
    if declared.len() != req.args.len() {
        return Err(BodyError::Inconsistent(format!(
            "descriptor declares {} parameters, {} arguments given",
            declared.len(),
            req.args.len()
        )));
    }

    out.write_str(&req.dubbo_version)?;
    out.write_str(&req.path)?;
    out.write_str(&req.version)?;
    out.write_str(&req.method)?;
    out.write_str(&req.parameter_types)?;
    for arg in &req.args {
        out.write_value(arg)?;
    }
    out.write_value(&Value::string_map(&req.attachments))?;
    Ok(())
}

fn encode_response(
    out: &mut dyn ObjectOutput,
    resp: &ResponseBody,
    status_ok: bool,
) -> Result<(), BodyError> {
    match (&resp.outcome, status_ok) {
        (Outcome::Error(message), false) => {
            out.write_str(message)?;
            return Ok(());
        }
        (Outcome::Error(_), true) => {
            return Err(BodyError::Inconsistent(
                "error outcome needs a non-OK status".to_string(),
            ));
        }
        (_, false) => {
            return Err(BodyError::Inconsistent(
                "a non-OK status carries an error outcome only".to_string(),
            ));
        }
        (Outcome::Value(v), true) => {
            out.write_int(RESPONSE_VALUE_WITH_ATTACHMENTS)?;
            out.write_value(v)?;
        }
        (Outcome::Null, true) => {
            out.write_int(RESPONSE_NULL_VALUE_WITH_ATTACHMENTS)?;
        }
        (Outcome::Exception(ex), true) => {
            out.write_int(RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS)?;
            out.write_value(&ex.to_value())?;
        }
    }
    out.write_value(&Value::string_map(&resp.attachments))?;
    Ok(())
}

/// Decodes the body bytes of a packet whose header has already been parsed.
pub fn decode_body(
    header: &Header,
    serializer: &dyn Serializer,
    data: &[u8],
) -> Result<Body, BodyError> {
    let kind = header
        .kind()
        .ok_or_else(|| BodyError::Malformed("package type names no packet kind".to_string()))?;

    match kind {
        // a Java peer puts a serialized null here, the bytes carry nothing
        PacketKind::HeartbeatRequest | PacketKind::HeartbeatResponse => Ok(Body::Heartbeat),
        PacketKind::Request | PacketKind::RequestOneWay => {
            let mut input = serializer.input(data);
            decode_request(input.as_mut()).map(Body::Request)
        }
        PacketKind::Response => {
            let ok = header.status == ResponseStatus::Ok.as_u8();
            let mut input = serializer.input(data);
            decode_response(input.as_mut(), ok).map(Body::Response)
        }
    }
}

fn decode_request(input: &mut dyn ObjectInput) -> Result<RequestBody, BodyError> {
    let dubbo_version = read_element(input, "dubbo version")?;
    let path = read_element(input, "path")?;
    let version = read_element(input, "service version")?;
    let method = read_element(input, "method name")?;
    let parameter_types = read_element(input, "parameter types")?;

    let count = value::split_descriptor(&parameter_types)
        .ok_or_else(|| {
            BodyError::Malformed(format!("invalid parameter descriptor {:?}", parameter_types))
        })?
        .len();
    let mut args = Vec::with_capacity(count);
    for i in 0..count {
        if input.is_empty() {
            return Err(BodyError::Malformed(format!(
                "descriptor declares {} arguments, body holds {}",
                count, i
            )));
        }
        args.push(input.read_value()?);
    }

    let attachments = if input.is_empty() {
        if carries_attachments(&dubbo_version) {
            return Err(BodyError::Malformed("missing attachments".to_string()));
        }
        Attachments::new()
    } else {
        read_attachments(input)?
    };
    ensure_consumed(input)?;

    Ok(RequestBody {
        dubbo_version,
        path,
        version,
        method,
        parameter_types,
        args,
        attachments,
    })
}

fn decode_response(input: &mut dyn ObjectInput, status_ok: bool) -> Result<ResponseBody, BodyError> {
    if !status_ok {
        let message = match input.read_value()? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => Exception::from_value(other)?.message,
        };
        return Ok(ResponseBody::new(Outcome::Error(message)));
    }

    let response_type = input.read_int()?;
    let (outcome, with_attachments) = match response_type {
        RESPONSE_WITH_EXCEPTION | RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS => (
            Outcome::Exception(Exception::from_value(input.read_value()?)?),
            response_type == RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS,
        ),
        RESPONSE_VALUE | RESPONSE_VALUE_WITH_ATTACHMENTS => (
            Outcome::Value(input.read_value()?),
            response_type == RESPONSE_VALUE_WITH_ATTACHMENTS,
        ),
        RESPONSE_NULL_VALUE | RESPONSE_NULL_VALUE_WITH_ATTACHMENTS => {
            (Outcome::Null, response_type == RESPONSE_NULL_VALUE_WITH_ATTACHMENTS)
        }
        other => {
            return Err(BodyError::Malformed(format!("unknown response type {}", other)));
        }
    };

    let attachments = if with_attachments {
        if input.is_empty() {
            return Err(BodyError::Malformed("missing attachments".to_string()));
        }
        read_attachments(input)?
    } else {
        Attachments::new()
    };
    ensure_consumed(input)?;

    Ok(ResponseBody {
        outcome,
        attachments,
    })
}

fn read_element(input: &mut dyn ObjectInput, name: &str) -> Result<String, BodyError> {
    if input.is_empty() {
        return Err(BodyError::Malformed(format!("missing {}", name)));
    }
    Ok(input.read_string()?)
}

fn read_attachments(input: &mut dyn ObjectInput) -> Result<Attachments, BodyError> {
    let entries = match input.read_value()? {
        Value::Map(entries) => entries,
        Value::Null => return Ok(Attachments::new()),
        other => {
            return Err(BodyError::Malformed(format!(
                "attachments encoded as {}",
                other.kind_name()
            )));
        }
    };

    let mut attachments = Attachments::new();
    for (k, v) in entries {
        let key = match k {
            Value::String(key) => key,
            other => {
                return Err(BodyError::Malformed(format!(
                    "attachment key of type {}",
                    other.kind_name()
                )));
            }
        };
        let value = match v {
            Value::String(s) => s,
            Value::Null => continue,
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(l) => l.to_string(),
            Value::Double(d) => d.to_string(),
            other => {
                return Err(BodyError::Malformed(format!(
                    "attachment {} holds a {}",
                    key,
                    other.kind_name()
                )));
            }
        };
        attachments.insert(key, value);
    }
    Ok(attachments)
}

fn ensure_consumed(input: &dyn ObjectInput) -> Result<(), BodyError> {
    if input.is_empty() {
        Ok(())
    } else {
        Err(BodyError::Malformed("trailing data after attachments".to_string()))
    }
}

/// Whether bodies of this protocol version always end with attachments.
fn carries_attachments(dubbo_version: &str) -> bool {
    let parts: Option<Vec<u32>> = dubbo_version
        .split('.')
        .map(|p| p.parse::<u32>().ok())
        .collect();
    match parts {
        Some(parts) if !parts.is_empty() => parts.as_slice() >= ATTACHMENTS_SINCE.as_slice(),
        // unknown formats are held to the current rules
        _ => true,
    }
}
