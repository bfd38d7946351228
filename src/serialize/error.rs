use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("unknown tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),

    #[error("invalid reference {0}")]
    InvalidReference(usize),

    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("body expands to more than {0} values")]
    TooManyValues(usize),

    #[error("unsupported value: {0}")]
    Unsupported(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;
