//! # Body Serialization
//!
//! Pluggable encodings for Dubbo bodies, selected per packet by the serialization id in
//! the header flag byte.
//!
//! ## Key Types
//!
//! - [`Serializer`] - A format, handing out per-body [`ObjectOutput`] / [`ObjectInput`]
//! - [`SerializerRegistry`] - Immutable id to format mapping
//! - [`Hessian2Serializer`] - Java-compatible Hessian 2.0 (id 2)
//! - [`FastJsonSerializer`] - Line-delimited JSON (id 6)
//!
//! ## Example
//!
//! ```ignore
//! let registry = SerializerRegistry::builder()
//!     .with_builtin()
//!     .register(Arc::new(MySerializer))?
//!     .build();
//! install_global(registry)?;
//! ```

pub mod error;
pub mod fastjson;
pub mod hessian2;
pub mod registry;
pub mod traits;

pub use error::SerializationError;
pub use fastjson::FastJsonSerializer;
pub use hessian2::Hessian2Serializer;
pub use registry::{
    MAX_SERIALIZATION_ID, RegistryError, SerializerRegistry, SerializerRegistryBuilder, global,
    install_global,
};
pub use traits::{ObjectInput, ObjectOutput, Serializer};

pub const HESSIAN2_SERIALIZATION_ID: u8 = 2;
pub const FASTJSON_SERIALIZATION_ID: u8 = 6;
