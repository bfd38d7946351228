//! # Dubbo Codec Module
//!
//! Frames Dubbo packages on a byte stream and encodes their bodies.
//!
//! ## Key Types
//!
//! - [`Header`] - 16-byte header with flags, status, correlation id and body length
//! - [`PacketKind`] - Request, one-way request, response and heartbeats
//! - [`Body`] - Request, response or heartbeat payload
//! - [`DubboCodec`] - `marshal` / `unmarshal` and the `tokio_util` codec traits
//! - [`Decoded`] - A package or the [`Shortfall`] that keeps it from decoding
//!
//! ## Example
//!
//! ```ignore
//! use dubbo_codec::codec::{Decoded, DubboCodec, Service};
//!
//! let codec = DubboCodec::default();
//! let service = Service::new("com.example.Greeter", "greet");
//! let frame = codec.marshal(&codec.request(1, service, vec!["world".into()]))?;
//! ```

pub mod body;
pub mod error;
pub mod header;
pub mod package;
pub mod stream;

pub use body::{
    Attachments, Body, Exception, Outcome, RequestBody, ResponseBody, Service, decode_body,
    encode_body,
};
pub use error::{BodyError, CodecError};
pub use header::{Header, PackageType, PacketKind, ResponseStatus};
pub use package::{Decoded, DubboCodec, Package, Shortfall};
