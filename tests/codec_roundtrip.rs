//! Marshal/unmarshal round trips through `DubboCodec`, including partial input handling.

use bytes::BytesMut;
use dubbo_codec::codec::{
    Body, CodecError, Decoded, DubboCodec, Exception, Header, Outcome, Package, PackageType,
    PacketKind, RequestBody, ResponseStatus, Service, Shortfall,
};
use dubbo_codec::config::CodecConfig;
use dubbo_codec::serialize::SerializerRegistry;
use dubbo_codec::value::{Object, Value};
use std::sync::Arc;
use std::time::Duration;

fn codec_with(config: CodecConfig) -> DubboCodec {
    DubboCodec::with_registry(config, Arc::new(SerializerRegistry::default()))
}

fn codec() -> DubboCodec {
    codec_with(CodecConfig::default())
}

fn canonical_service() -> Service {
    Service::new("Service", "Method")
        .with_path("path")
        .with_version("2.6")
        .with_timeout(Duration::from_secs(1))
}

fn decode_one(codec: &DubboCodec, buf: &mut BytesMut) -> Package {
    match codec.unmarshal(buf).unwrap() {
        Decoded::Package(package) => package,
        Decoded::NeedMore(shortfall) => panic!("expected a package, got {:?}", shortfall),
    }
}

#[test]
fn test_heartbeat_round_trip() {
    let codec = codec();
    let mut buf = codec.marshal(&Package::heartbeat(10086, 2)).unwrap();
    assert_eq!(buf.len(), Header::HEADER_LENGTH);

    let package = decode_one(&codec, &mut buf);
    assert!(buf.is_empty());
    assert_eq!(
        package.header.package_type,
        PackageType::HEARTBEAT | PackageType::REQUEST | PackageType::REQUEST_TWO_WAY
    );
    assert_eq!(package.header.serial_id, 2);
    assert_eq!(package.header.id, 10086);
    assert_eq!(package.header.body_len, 0);
    assert_eq!(package.body, Body::Heartbeat);
}

#[test]
fn test_canonical_request_round_trip() {
    let codec = codec();
    let package = codec.request(10086, canonical_service(), vec![Value::from("a")]);
    let mut buf = codec.marshal(&package).unwrap();

    let decoded = decode_one(&codec, &mut buf);
    assert_eq!(decoded.kind(), Some(PacketKind::Request));
    assert_eq!(
        decoded.header.package_type,
        PackageType::REQUEST | PackageType::REQUEST_TWO_WAY
    );
    assert_eq!(decoded.header.id, 10086);
    assert_eq!(decoded.service, canonical_service());

    let req = match &decoded.body {
        Body::Request(req) => req,
        other => panic!("unexpected body {:?}", other),
    };
    assert_eq!(req.dubbo_version, "2.0.2");
    assert_eq!(req.path, "path");
    assert_eq!(req.version, "2.6");
    assert_eq!(req.method, "Method");
    assert_eq!(req.parameter_types, "Ljava/lang/String;");
    assert_eq!(req.args, vec![Value::from("a")]);

    let attachments: Vec<(&str, &str)> = req
        .attachments
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        attachments,
        vec![
            ("dubbo", "2.0.2"),
            ("interface", "Service"),
            ("path", "path"),
            ("timeout", "1000"),
            ("version", "2.6"),
        ]
    );
    assert_eq!(decoded.body, package.body);
}

#[test]
fn test_oneway_request_round_trip() {
    let codec = codec();
    let service = canonical_service();
    let body = RequestBody::new(&service, vec![Value::Int(1), Value::Long(2)]);
    let package = Package::oneway_request(3, 2, service, body);
    let mut buf = codec.marshal(&package).unwrap();
    assert_eq!(buf[2], 0x82);

    let decoded = decode_one(&codec, &mut buf);
    assert_eq!(decoded.header.package_type, PackageType::REQUEST);
    assert_eq!(decoded.kind(), Some(PacketKind::RequestOneWay));
    assert_eq!(decoded.body, package.body);
}

#[test]
fn test_response_round_trips() {
    let codec = codec();
    let packages = vec![
        Package::response(1, 2, Outcome::Value(Value::List(vec![Value::from("x"), Value::Int(2)]))),
        Package::response(2, 2, Outcome::Null),
        Package::response(3, 2, Outcome::Exception(Exception::new("boom"))),
        Package::heartbeat_response(4, 2),
    ];

    for package in packages {
        let mut buf = codec.marshal(&package).unwrap();
        let decoded = decode_one(&codec, &mut buf);
        assert_eq!(decoded.header.id, package.header.id);
        assert_eq!(decoded.header.status, 20);
        assert_eq!(decoded.kind(), package.kind());
        assert_eq!(decoded.body, package.body);
    }
}

#[test]
fn test_error_response_round_trip() {
    let codec = codec();
    let package = Package::error_response(9, 2, ResponseStatus::ServiceNotFound, "no provider");
    let mut buf = codec.marshal(&package).unwrap();

    let decoded = decode_one(&codec, &mut buf);
    assert_eq!(
        decoded.header.package_type,
        PackageType::RESPONSE | PackageType::RESPONSE_EXCEPTION
    );
    assert_eq!(
        decoded.header.response_status(),
        Some(ResponseStatus::ServiceNotFound)
    );
    assert_eq!(decoded.body, package.body);
    assert!(decoded.exception().is_none());
}

#[test]
fn test_exception_accessor() {
    let codec = codec();
    let ex = Exception::new("bad input").with_class("java.lang.IllegalArgumentException");
    let mut buf = codec
        .marshal(&Package::response(5, 2, Outcome::Exception(ex.clone())))
        .unwrap();
    assert_eq!(decode_one(&codec, &mut buf).exception(), Some(&ex));
}

#[test]
fn test_fastjson_round_trip() {
    let config = CodecConfig {
        default_serial_id: 6,
        ..CodecConfig::default()
    };
    let codec = codec_with(config);
    let package = codec.request(
        11,
        canonical_service(),
        vec![Value::from("a"), Value::Int(7), Value::Bool(true)],
    );
    let mut buf = codec.marshal(&package).unwrap();
    assert_eq!(buf[2] & 0x1f, 6);

    let decoded = decode_one(&codec, &mut buf);
    assert_eq!(decoded.header.serial_id, 6);
    assert_eq!(decoded.body, package.body);
}

#[test]
fn test_partial_input_is_not_consumed() {
    let codec = codec();
    let frame = codec
        .marshal(&codec.request(1, canonical_service(), vec![Value::from("a")]))
        .unwrap();
    let total = frame.len();

    let mut buf = BytesMut::new();
    for (i, byte) in frame.iter().enumerate() {
        if i > 0 {
            let expected = if i < Header::HEADER_LENGTH {
                Shortfall::Header { available: i }
            } else {
                Shortfall::Body {
                    available: i,
                    required: total,
                }
            };
            assert_eq!(codec.unmarshal(&mut buf).unwrap(), Decoded::NeedMore(expected));
            assert_eq!(buf.len(), i);
        }
        buf.extend_from_slice(&[*byte]);
    }

    let package = decode_one(&codec, &mut buf);
    assert_eq!(package.kind(), Some(PacketKind::Request));
    assert!(buf.is_empty());
}

#[test]
fn test_hello_is_header_shortfall() {
    let codec = codec();
    let mut buf = BytesMut::from(&b"hello"[..]);
    match codec.unmarshal(&mut buf).unwrap() {
        Decoded::NeedMore(shortfall) => {
            assert!(shortfall.is_header());
            assert_eq!(shortfall, Shortfall::Header { available: 5 });
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(&buf[..], b"hello");
}

#[test]
fn test_unknown_serialization_consumes_frame() {
    let codec = codec();
    let mut header = Header::new(PackageType::REQUEST | PackageType::REQUEST_TWO_WAY, 9, 42);
    header.body_len = 4;
    let mut buf = BytesMut::from(&header.encode().unwrap()[..]);
    buf.extend_from_slice(b"junk");
    buf.extend_from_slice(&codec.marshal(&Package::heartbeat(43, 2)).unwrap());

    assert!(matches!(
        codec.unmarshal(&mut buf),
        Err(CodecError::UnsupportedSerialization(9))
    ));
    assert_eq!(decode_one(&codec, &mut buf).header.id, 43);

    // marshalling with an unregistered id fails the same way
    assert!(matches!(
        codec.marshal(&Package::heartbeat(1, 9)),
        Err(CodecError::UnsupportedSerialization(9))
    ));
}

#[test]
fn test_malformed_body_is_not_fatal() {
    let codec = codec();
    let mut header = Header::new(PackageType::REQUEST | PackageType::REQUEST_TWO_WAY, 2, 77);
    header.body_len = 1;
    let mut buf = BytesMut::from(&header.encode().unwrap()[..]);
    buf.extend_from_slice(&[0x91]);

    let err = codec.unmarshal(&mut buf).unwrap_err();
    assert!(!err.is_connection_fatal());
    assert!(matches!(err, CodecError::Serialization { id: 77, .. }));
    assert!(buf.is_empty());
}

#[test]
fn test_hostile_body_fails_the_packet_only() {
    let codec = codec();
    let body = vec![b'O'; 200_000];
    let mut header = Header::new(PackageType::REQUEST | PackageType::REQUEST_TWO_WAY, 2, 78);
    header.body_len = body.len() as u32;
    let mut buf = BytesMut::from(&header.encode().unwrap()[..]);
    buf.extend_from_slice(&body);
    buf.extend_from_slice(&codec.marshal(&Package::heartbeat(79, 2)).unwrap());

    let err = codec.unmarshal(&mut buf).unwrap_err();
    assert!(!err.is_connection_fatal());
    assert!(matches!(err, CodecError::Serialization { id: 78, .. }));
    assert_eq!(decode_one(&codec, &mut buf).header.id, 79);
}

#[test]
fn test_fastjson_keeps_field_order() {
    let config = CodecConfig {
        default_serial_id: 6,
        ..CodecConfig::default()
    };
    let codec = codec_with(config);
    let user = Object::new("com.example.User")
        .with_field("name", "bob")
        .with_field("age", 3);
    let package = Package::response(5, 6, Outcome::Value(Value::Object(user)));
    let mut buf = codec.marshal(&package).unwrap();
    assert_eq!(decode_one(&codec, &mut buf).body, package.body);
}

#[test]
fn test_bad_magic_is_fatal() {
    let codec = codec();
    let mut buf = codec.marshal(&Package::heartbeat(1, 2)).unwrap();
    buf[0] = 0xca;
    let err = codec.unmarshal(&mut buf).unwrap_err();
    assert!(err.is_connection_fatal());
    assert_eq!(buf.len(), Header::HEADER_LENGTH);
}

#[test]
fn test_payload_limit() {
    let config = CodecConfig {
        payload_limit: 64,
        ..CodecConfig::default()
    };
    let codec = codec_with(config);

    let mut header = Header::new(PackageType::RESPONSE, 2, 5);
    header.status = 20;
    header.body_len = 1000;
    let mut buf = BytesMut::from(&header.encode().unwrap()[..]);
    let err = codec.unmarshal(&mut buf).unwrap_err();
    assert!(matches!(
        err,
        CodecError::PayloadTooLarge {
            length: 1000,
            limit: 64
        }
    ));
    assert!(err.is_connection_fatal());
    assert_eq!(buf.len(), Header::HEADER_LENGTH);

    let big = codec.request(6, canonical_service(), vec![Value::from("x".repeat(100))]);
    assert!(matches!(
        codec.marshal(&big),
        Err(CodecError::PayloadTooLarge { limit: 64, .. })
    ));
}
