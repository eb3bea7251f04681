use clap::{Args, Subcommand};
use std::path::PathBuf;

use pdubuf_pdu::{DEFAULT_MAX_PAYLOAD, MAX_PAYLOAD};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose one PDU and send it.
    Send(SendArgs),
    /// Accept one connection and print the PDUs it delivers.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Service byte.
    #[arg(long, short = 's')]
    pub service: u8,
    /// Opcode byte.
    #[arg(long, short = 'o')]
    pub opcode: u8,
    /// Payload descriptor, one character per field (cCsSiIlLmM0).
    #[arg(long, value_name = "DESC")]
    pub fmt: Option<String>,
    /// Field value, repeated once per descriptor character.
    #[arg(long = "arg", value_name = "VALUE", requires = "fmt", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// File to open and pass to the peer alongside the PDU.
    #[arg(long = "fd", value_name = "PATH")]
    pub fds: Vec<PathBuf>,
    /// Payload capacity of the send buffer.
    #[arg(long, default_value_t = MAX_PAYLOAD)]
    pub max_payload: usize,
    /// How long to wait for the socket to drain (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N PDUs.
    #[arg(long)]
    pub count: Option<usize>,
    /// Decode each payload with this descriptor.
    #[arg(long, value_name = "DESC")]
    pub fmt: Option<String>,
    /// Width of each m/M field in --fmt, in order.
    #[arg(long = "mem-len", value_name = "N", requires = "fmt")]
    pub mem_lens: Vec<usize>,
    /// Largest payload accepted; bigger headers end the session.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
