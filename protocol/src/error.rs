/// Errors raised while encoding or decoding a wire frame.
///
/// Per the error-handling design (spec §7), a malformed message — a short
/// read on a required field — gets the connection dropped rather than a
/// reply; an unrecognised message id gets a generic invalid-message reply
/// and the connection survives. Callers distinguish the two cases by
/// matching on [`CodecError::UnknownMessageId`] versus everything else.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of buffer: needed {needed} more byte(s)")]
    UnexpectedEof { needed: usize },

    #[error("string field exceeds maximum wire length ({len} > {max})")]
    StringTooLong { len: usize, max: usize },

    #[error("frame body exceeds maximum size ({len} > {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("unknown message id {0}")]
    UnknownMessageId(u16),

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("invalid enum discriminant {0} for {1}")]
    InvalidDiscriminant(u32, &'static str),
}
