//! Unix socket transport for PDU buffers.
//!
//! The PDU layer only needs two things from a transport: a single
//! non-blocking write attempt that may carry ancillary data, and a single
//! read attempt that collects any descriptors passed alongside the bytes.
//! [`PduTransport`] captures exactly that. Everything else here (binding,
//! accepting, connecting) is convenience for callers that own the socket
//! lifecycle.

pub mod error;

#[cfg(unix)]
pub mod ancillary;
#[cfg(unix)]
pub mod traits;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use ancillary::{AncillaryData, MAX_RECV_FDS};
#[cfg(unix)]
pub use traits::{IpcStream, PduTransport, PeerCredentials};
#[cfg(unix)]
pub use uds::UnixDomainSocket;
