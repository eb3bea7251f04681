/// Errors raised by the descriptor engine and the PDU buffers.
#[derive(Debug, thiserror::Error)]
pub enum PduError {
    /// A decoded field would read past the PDU's valid payload.
    #[error("PDU overflow: {width} bytes at offset {offset} exceed payload length {len}")]
    Overflow {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// The descriptor or its arguments are malformed.
    #[error("invalid format: {0}")]
    Format(#[from] FormatError),

    /// An encoded field would land past the buffer's payload capacity.
    #[error("PDU capacity exceeded: {width} bytes at offset {offset}, capacity {capacity}")]
    Capacity {
        offset: usize,
        width: usize,
        capacity: usize,
    },

    /// A payload size exceeds what the buffer or the wire format can hold.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A byte block is too short to hold the PDU it claims to contain.
    #[error("truncated PDU ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// Memory for a buffer or a decoded field could not be reserved.
    #[error("allocation failed: {0}")]
    Alloc(#[from] std::collections::TryReserveError),

    /// The transport failed for a reason other than would-block.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer closed the stream while a PDU was expected.
    #[error("connection closed (incomplete PDU)")]
    ConnectionClosed,

    /// The send buffer's ancillary builder failed on an earlier attempt.
    #[error("ancillary data unavailable: builder failed")]
    AncillaryUnavailable,
}

/// Ways a format descriptor can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The descriptor contains a character that names no field type.
    #[error("unknown format character {0:?}")]
    UnknownTag(char),

    /// No NUL terminator in the scanned range.
    #[error("string at offset {offset} is not terminated")]
    Unterminated { offset: usize },

    /// The argument or slot at `index` does not fit its descriptor tag.
    #[error("argument {index} does not match format character {tag:?}")]
    Mismatch { index: usize, tag: char },

    /// The number of arguments or slots differs from the descriptor.
    #[error("format expects {expected} arguments, got {got}")]
    Count { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, PduError>;
