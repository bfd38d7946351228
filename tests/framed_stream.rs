//! `DubboCodec` as a `tokio_util` codec over an in-memory duplex stream.

use dubbo_codec::codec::{CodecError, DubboCodec, Header, Outcome, Package, PackageType, Service};
use dubbo_codec::config::{CodecConfig, MalformedBodyPolicy};
use dubbo_codec::serialize::SerializerRegistry;
use dubbo_codec::value::Value;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};

fn codec_with_policy(policy: MalformedBodyPolicy) -> DubboCodec {
    let config = CodecConfig {
        malformed_body_policy: policy,
        ..CodecConfig::default()
    };
    DubboCodec::with_registry(config, Arc::new(SerializerRegistry::default()))
}

/// A well-framed request whose body does not start with a string.
fn undecodable_frame(id: i64) -> Vec<u8> {
    let mut header = Header::new(PackageType::REQUEST | PackageType::REQUEST_TWO_WAY, 2, id);
    header.body_len = 1;
    let mut frame = header.encode().unwrap().to_vec();
    frame.push(0x91);
    frame
}

#[tokio::test]
async fn test_framed_round_trip() {
    let codec = codec_with_policy(MalformedBodyPolicy::Drop);
    let (client, server) = tokio::io::duplex(64);

    let mut writer = FramedWrite::new(client, codec.clone());
    let mut reader = FramedRead::new(server, codec.clone());

    let service = Service::new("com.example.Greeter", "greet");
    let sent = vec![
        codec.request(1, service, vec![Value::from("world".repeat(40))]),
        Package::response(1, 2, Outcome::Value(Value::from("hello"))),
        Package::heartbeat(2, 2),
    ];

    let to_send = sent.clone();
    let write_task = tokio::spawn(async move {
        for package in to_send {
            writer.send(package).await.unwrap();
        }
    });

    for expected in &sent {
        let received = reader.next().await.unwrap().unwrap();
        assert_eq!(received.header.id, expected.header.id);
        assert_eq!(received.kind(), expected.kind());
        assert_eq!(received.body, expected.body);
    }
    write_task.await.unwrap();
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_drop_policy_skips_bad_frames() {
    let codec = codec_with_policy(MalformedBodyPolicy::Drop);
    let (mut client, server) = tokio::io::duplex(1024);

    let mut bytes = undecodable_frame(1);
    bytes.extend_from_slice(&codec.marshal(&Package::heartbeat(2, 2)).unwrap());
    client.write_all(&bytes).await.unwrap();
    drop(client);

    let mut reader = FramedRead::new(server, codec);
    let package = reader.next().await.unwrap().unwrap();
    assert_eq!(package.header.id, 2);
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_close_policy_surfaces_bad_frames() {
    let codec = codec_with_policy(MalformedBodyPolicy::Close);
    let (mut client, server) = tokio::io::duplex(1024);

    let mut bytes = undecodable_frame(1);
    bytes.extend_from_slice(&codec.marshal(&Package::heartbeat(2, 2)).unwrap());
    client.write_all(&bytes).await.unwrap();
    drop(client);

    let mut reader = FramedRead::new(server, codec);
    let err = reader.next().await.unwrap().unwrap_err();
    assert!(matches!(err, CodecError::Serialization { id: 1, .. }));
}

#[tokio::test]
async fn test_fatal_errors_ignore_policy() {
    let codec = codec_with_policy(MalformedBodyPolicy::Drop);
    let (mut client, server) = tokio::io::duplex(1024);

    let mut bytes = codec.marshal(&Package::heartbeat(1, 2)).unwrap().to_vec();
    bytes[1] = 0x00;
    client.write_all(&bytes).await.unwrap();
    drop(client);

    let mut reader = FramedRead::new(server, codec);
    let err = reader.next().await.unwrap().unwrap_err();
    assert!(matches!(err, CodecError::BadMagic(0xda, 0x00)));
}
