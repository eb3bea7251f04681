//! Service/opcode PDUs over Unix domain sockets.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket transport with descriptor passing
//! - [`pdu`]: PDU envelope, descriptor marshalling, receive and send buffers

/// Re-export transport types.
pub mod transport {
    pub use pdubuf_transport::*;
}

/// Re-export PDU types.
pub mod pdu {
    pub use pdubuf_pdu::*;
}
