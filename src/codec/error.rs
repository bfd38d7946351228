use crate::serialize::SerializationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bad magic number 0x{0:02x}{1:02x}, stream is out of sync")]
    BadMagic(u8, u8),

    #[error("body of {length} bytes exceeds payload limit of {limit} bytes")]
    PayloadTooLarge { length: usize, limit: usize },

    #[error("unsupported serialization id {0}")]
    UnsupportedSerialization(u8),

    #[error("malformed body in packet {id}: {reason}")]
    MalformedBody { id: i64, reason: String },

    #[error("serialization failed in packet {id}: {source}")]
    Serialization {
        id: i64,
        #[source]
        source: SerializationError,
    },

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the byte stream can no longer be trusted and the connection must close.
    ///
    /// Body-level failures leave the stream aligned on the next frame.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::BadMagic(..) | CodecError::PayloadTooLarge { .. } | CodecError::Io(_)
        )
    }

    pub(crate) fn from_body(id: i64, err: BodyError) -> Self {
        match err {
            BodyError::Malformed(reason) => CodecError::MalformedBody { id, reason },
            BodyError::Serialization(source) => CodecError::Serialization { id, source },
            BodyError::Inconsistent(reason) => CodecError::InvalidPackage(reason),
        }
    }
}

/// Failures of the body codec, before the packet id is attached.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("{0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
