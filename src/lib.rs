pub mod codec;
pub mod config;
pub mod logging;
pub mod serialize;
pub mod value;

pub use codec::{
    Body, CodecError, Decoded, DubboCodec, Header, Outcome, Package, PackageType, PacketKind,
    RequestBody, ResponseBody, ResponseStatus, Service, Shortfall,
};
pub use config::{CodecConfig, ConfigError, MalformedBodyPolicy};
pub use serialize::{Serializer, SerializerRegistry};
pub use value::{Object, Value};
