use thiserror::Error;

/// Failure to turn received payload bytes back into a [`Move`](crate::model::game::Move).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8 ({len} bytes)")]
    InvalidUtf8 { len: usize },

    #[error("unrecognized move {0:?}")]
    UnknownMove(String),
}
