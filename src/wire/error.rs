use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("field '{field}' is {len} bytes, max is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("json encode failure: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame ended inside field '{0}'")]
    Truncated(&'static str),
    #[error("{0} unexpected bytes after the last field")]
    TrailingBytes(usize),
    #[error("field '{0}' is not valid utf-8")]
    InvalidUtf8(&'static str),
    #[error("error flag must be 0 or 1, got {0}")]
    BadErrorFlag(u8),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown codec selector {0:#04x}")]
    UnknownCodec(u8),
}

/// Failure of a framed connection. Any of these ends the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection io failure: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
