//! PDU envelope, descriptor-driven payload marshalling, and the receive and
//! send buffers that move PDUs across a stream transport.
//!
//! Every PDU starts with a 4-byte header:
//! - service (1 byte)
//! - opcode (1 byte)
//! - payload length (2 bytes, host byte order)
//!
//! Receive buffers reassemble PDUs from partial reads; send buffers resume
//! partial writes and attach ancillary data to the first byte.

pub mod error;
pub mod format;
pub mod pdu;
#[cfg(unix)]
pub mod queue;
#[cfg(unix)]
pub mod rbuf;
#[cfg(unix)]
pub mod wbuf;

pub use error::{FormatError, PduError, Result};
pub use format::{append, read_at, write_at, Arg, Slot, Tag};
pub use pdu::{PduConfig, PduMut, PduRef, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_PAYLOAD};
#[cfg(unix)]
pub use pdubuf_transport::AncillaryData;
#[cfg(unix)]
pub use queue::SendQueue;
#[cfg(unix)]
pub use rbuf::ReceiveBuffer;
#[cfg(unix)]
pub use wbuf::{AncillaryBuilder, FdTail, SendBuffer, SendState};
