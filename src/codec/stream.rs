use super::error::{CodecError, Result};
use super::package::{Decoded, DubboCodec, Package};
use crate::config::MalformedBodyPolicy;
use bytes::BytesMut;
use log::warn;
use tokio_util::codec::{Decoder, Encoder};

/// Framing for `FramedRead` / `FramedWrite` over a Dubbo connection.
///
/// Body-level failures go through the configured [`MalformedBodyPolicy`]. Fatal errors are
/// always returned.
impl Decoder for DubboCodec {
    type Item = Package;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.unmarshal(src) {
                Ok(Decoded::Package(package)) => return Ok(Some(package)),
                Ok(Decoded::NeedMore(_)) => return Ok(None),
                Err(e) if e.is_connection_fatal() => return Err(e),
                Err(e) => match self.config().malformed_body_policy {
                    MalformedBodyPolicy::Close => return Err(e),
                    MalformedBodyPolicy::Drop => {
                        // the frame is already consumed, try the next one
                        warn!("Dropping undecodable packet: {}", e);
                    }
                },
            }
        }
    }
}

impl Encoder<&Package> for DubboCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Package, dst: &mut BytesMut) -> Result<()> {
        self.marshal_into(item, dst)
    }
}

impl Encoder<Package> for DubboCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Package, dst: &mut BytesMut) -> Result<()> {
        self.marshal_into(&item, dst)
    }
}
