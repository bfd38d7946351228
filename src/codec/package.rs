use super::body::{self, Body, Exception, Outcome, RequestBody, ResponseBody, Service};
use super::error::{CodecError, Result};
use super::header::{Header, PackageType, PacketKind, ResponseStatus};
use crate::config::CodecConfig;
use crate::serialize::{self, Serializer, SerializerRegistry};
use crate::value::Value;
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, trace};
use std::sync::Arc;

/// A decoded or to-be-encoded Dubbo packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub header: Header,
    /// Filled for requests only.
    pub service: Service,
    pub body: Body,
}

impl Package {
    /// Two-way request; `serial_id` picks the body serializer.
    pub fn request(id: i64, serial_id: u8, service: Service, body: RequestBody) -> Self {
        Package {
            header: Header::new(PacketKind::Request.package_type(), serial_id, id),
            service,
            body: Body::Request(body),
        }
    }

    pub fn oneway_request(id: i64, serial_id: u8, service: Service, body: RequestBody) -> Self {
        Package {
            header: Header::new(PacketKind::RequestOneWay.package_type(), serial_id, id),
            service,
            body: Body::Request(body),
        }
    }

    /// Successful response to the request with the same `id`.
    pub fn response(id: i64, serial_id: u8, outcome: Outcome) -> Self {
        let mut header = Header::new(PacketKind::Response.package_type(), serial_id, id);
        header.status = ResponseStatus::Ok.as_u8();
        Package {
            header,
            service: Service::default(),
            body: Body::Response(ResponseBody::new(outcome)),
        }
    }

    /// Failed response carrying only `message`. `status` must not be OK.
    pub fn error_response(
        id: i64,
        serial_id: u8,
        status: ResponseStatus,
        message: impl Into<String>,
    ) -> Self {
        let mut header = Header::new(
            PackageType::RESPONSE | PackageType::RESPONSE_EXCEPTION,
            serial_id,
            id,
        );
        header.status = status.as_u8();
        Package {
            header,
            service: Service::default(),
            body: Body::Response(ResponseBody::new(Outcome::Error(message.into()))),
        }
    }

    pub fn heartbeat(id: i64, serial_id: u8) -> Self {
        Package {
            header: Header::new(PacketKind::HeartbeatRequest.package_type(), serial_id, id),
            service: Service::default(),
            body: Body::Heartbeat,
        }
    }

    pub fn heartbeat_response(id: i64, serial_id: u8) -> Self {
        let mut header = Header::new(PacketKind::HeartbeatResponse.package_type(), serial_id, id);
        header.status = ResponseStatus::Ok.as_u8();
        Package {
            header,
            service: Service::default(),
            body: Body::Heartbeat,
        }
    }

    pub fn kind(&self) -> Option<PacketKind> {
        self.header.kind()
    }

    /// The exception a successful response reports, if any.
    pub fn exception(&self) -> Option<&Exception> {
        match &self.body {
            Body::Response(ResponseBody {
                outcome: Outcome::Exception(ex),
                ..
            }) => Some(ex),
            _ => None,
        }
    }
}

/// Result of [`DubboCodec::unmarshal`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Package(Package),
    /// Not enough bytes buffered yet. Nothing was consumed.
    NeedMore(Shortfall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortfall {
    /// Fewer than 16 bytes, the header itself is incomplete.
    Header { available: usize },
    /// Header complete, body partially buffered. Both counts include the header.
    Body { available: usize, required: usize },
}

impl Shortfall {
    pub fn is_header(&self) -> bool {
        matches!(self, Shortfall::Header { .. })
    }

    /// Total frame size needed, when known.
    pub fn required(&self) -> Option<usize> {
        match self {
            Shortfall::Header { .. } => None,
            Shortfall::Body { required, .. } => Some(*required),
        }
    }
}

/// Marshals and unmarshals Dubbo packages.
///
/// Holds no per-connection state; clones share the config and registry.
#[derive(Debug, Clone)]
pub struct DubboCodec {
    config: Arc<CodecConfig>,
    registry: Arc<SerializerRegistry>,
}

impl Default for DubboCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl DubboCodec {
    /// Codec over the process-wide serializer registry.
    pub fn new(config: CodecConfig) -> Self {
        Self::with_registry(config, serialize::global())
    }

    pub fn with_registry(config: CodecConfig, registry: Arc<SerializerRegistry>) -> Self {
        DubboCodec {
            config: Arc::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SerializerRegistry> {
        &self.registry
    }

    /// Two-way request using the configured dubbo version and serializer.
    pub fn request(&self, id: i64, service: Service, args: Vec<Value>) -> Package {
        let body = RequestBody::with_dubbo_version(&self.config.dubbo_version, &service, args);
        Package::request(id, self.config.default_serial_id, service, body)
    }

    fn serializer(&self, id: u8) -> Result<&Arc<dyn Serializer>> {
        self.registry
            .get(id)
            .ok_or(CodecError::UnsupportedSerialization(id))
    }

    /// Encodes `package` into one contiguous frame.
    pub fn marshal(&self, package: &Package) -> Result<BytesMut> {
        let mut dst = BytesMut::new();
        self.marshal_into(package, &mut dst)?;
        Ok(dst)
    }

    /// Appends the frame for `package` to `dst`. On error `dst` is left untouched.
    pub fn marshal_into(&self, package: &Package, dst: &mut BytesMut) -> Result<()> {
        let header = &package.header;
        let kind = header.kind().ok_or_else(|| {
            CodecError::InvalidPackage(format!(
                "package type {:?} names no packet kind",
                header.package_type
            ))
        })?;
        if kind == PacketKind::Response {
            let ok = header.status == ResponseStatus::Ok.as_u8();
            if ok && header.package_type.contains(PackageType::RESPONSE_EXCEPTION) {
                return Err(CodecError::InvalidPackage(
                    "RESPONSE_EXCEPTION set on a response with OK status".to_string(),
                ));
            }
        }

        let serializer = self.serializer(header.serial_id)?;
        let body = body::encode_body(header, &package.body, serializer.as_ref())
            .map_err(|e| CodecError::from_body(header.id, e))?;
        if body.len() > self.config.payload_limit {
            return Err(CodecError::PayloadTooLarge {
                length: body.len(),
                limit: self.config.payload_limit,
            });
        }
        let body_len = u32::try_from(body.len()).map_err(|_| CodecError::PayloadTooLarge {
            length: body.len(),
            limit: u32::MAX as usize,
        })?;

        let header_bytes = Header {
            body_len,
            ..header.clone()
        }
        .encode()?;

        dst.reserve(Header::HEADER_LENGTH + body.len());
        dst.put_slice(&header_bytes);
        dst.put_slice(&body);
        trace!(
            "Marshalled {:?} packet {} ({} body bytes, {})",
            kind,
            header.id,
            body.len(),
            serializer.name()
        );
        Ok(())
    }

    /// Decodes the frame at the front of `src`.
    ///
    /// A complete frame is consumed even when its body fails to decode, so the next call
    /// starts at the following frame. Connection-fatal errors consume nothing.
    pub fn unmarshal(&self, src: &mut BytesMut) -> Result<Decoded> {
        let header = match Header::decode(&src[..])? {
            Some(header) => header,
            None => {
                debug!(
                    "Need more data for header: {} of {} bytes",
                    src.len(),
                    Header::HEADER_LENGTH
                );
                return Ok(Decoded::NeedMore(Shortfall::Header {
                    available: src.len(),
                }));
            }
        };

        let body_len = header.body_len as usize;
        if body_len > self.config.payload_limit {
            return Err(CodecError::PayloadTooLarge {
                length: body_len,
                limit: self.config.payload_limit,
            });
        }

        let required = Header::HEADER_LENGTH + body_len;
        if src.len() < required {
            debug!(
                "Need more data for packet {}: {} of {} bytes",
                header.id,
                src.len(),
                required
            );
            src.reserve(required - src.len());
            return Ok(Decoded::NeedMore(Shortfall::Body {
                available: src.len(),
                required,
            }));
        }

        src.advance(Header::HEADER_LENGTH);
        let frame = src.split_to(body_len);

        let serializer = self.serializer(header.serial_id)?;
        let body = body::decode_body(&header, serializer.as_ref(), &frame)
            .map_err(|e| CodecError::from_body(header.id, e))?;
        let service = match &body {
            Body::Request(req) => req.service(),
            _ => Service::default(),
        };

        trace!(
            "Unmarshalled {:?} packet {} ({} body bytes, {})",
            header.kind(),
            header.id,
            body_len,
            serializer.name()
        );
        Ok(Decoded::Package(Package {
            header,
            service,
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> DubboCodec {
        DubboCodec::with_registry(CodecConfig::default(), Arc::new(SerializerRegistry::default()))
    }

    #[test]
    fn test_marshal_rejects_empty_type() {
        let mut package = Package::heartbeat(1, 2);
        package.header.package_type = PackageType::empty();
        assert!(matches!(
            codec().marshal(&package),
            Err(CodecError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_marshal_rejects_body_kind_mismatch() {
        let mut package = Package::heartbeat(1, 2);
        package.body = Body::Response(ResponseBody::new(Outcome::Null));
        assert!(matches!(
            codec().marshal(&package),
            Err(CodecError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_marshal_rejects_status_outcome_mismatch() {
        let mut package = Package::response(1, 2, Outcome::Null);
        package.header.status = ResponseStatus::ServerError.as_u8();
        assert!(matches!(
            codec().marshal(&package),
            Err(CodecError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_marshal_into_leaves_buffer_on_error() {
        let mut dst = BytesMut::from(&b"abc"[..]);
        let package = Package::heartbeat(1, 17);
        assert!(matches!(
            codec().marshal_into(&package, &mut dst),
            Err(CodecError::UnsupportedSerialization(17))
        ));
        assert_eq!(&dst[..], b"abc");
    }

    #[test]
    fn test_unmarshal_consumes_one_frame() {
        let codec = codec();
        let mut src = codec.marshal(&Package::heartbeat(1, 2)).unwrap();
        src.extend_from_slice(&codec.marshal(&Package::heartbeat_response(1, 2)).unwrap());

        match codec.unmarshal(&mut src).unwrap() {
            Decoded::Package(p) => assert_eq!(p.kind(), Some(PacketKind::HeartbeatRequest)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(src.len(), Header::HEADER_LENGTH);
        match codec.unmarshal(&mut src).unwrap() {
            Decoded::Package(p) => assert_eq!(p.kind(), Some(PacketKind::HeartbeatResponse)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(src.is_empty());
    }

    #[test]
    fn test_shortfall_helpers() {
        assert!(Shortfall::Header { available: 3 }.is_header());
        assert_eq!(Shortfall::Header { available: 3 }.required(), None);
        let body = Shortfall::Body {
            available: 20,
            required: 40,
        };
        assert!(!body.is_header());
        assert_eq!(body.required(), Some(40));
    }
}
