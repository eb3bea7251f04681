use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use pdubuf_pdu::{append, Arg, FdTail, SendBuffer};
use pdubuf_transport::{IpcStream, UnixDomainSocket};
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{
    io_error, pdu_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE,
};
use crate::fields::{parse_args, OwnedArg};
use crate::output::{print_pdu, OutputFormat, PduReport};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let values = match &args.fmt {
        Some(fmt) => parse_args(fmt, &args.args)?,
        None => Vec::new(),
    };

    let files = args
        .fds
        .iter()
        .map(|path| {
            File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
        })
        .collect::<CliResult<Vec<_>>>()?;
    let raw_fds = files.iter().map(AsRawFd::as_raw_fd).collect::<Vec<RawFd>>();

    let mut wbuf = SendBuffer::with_builder(args.max_payload, FdTail::tail_len(files.len()), FdTail)
        .map_err(|err| pdu_error("buffer setup failed", err))?;
    compose(&mut wbuf, &args, &values)?;
    FdTail::store(wbuf.tail_mut(), &raw_fds)
        .map_err(|err| pdu_error("descriptor setup failed", err))?;

    let mut stream = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    transmit(&mut wbuf, &mut stream, timeout)?;

    print_pdu(
        &PduReport {
            event: "sent",
            pdu: wbuf.pdu(),
            fields: None,
            fds: files.len(),
        },
        format,
    );
    Ok(SUCCESS)
}

fn compose(wbuf: &mut SendBuffer, args: &SendArgs, values: &[OwnedArg]) -> CliResult<()> {
    let mut pdu = wbuf.pdu_mut();
    pdu.init(args.service, args.opcode);
    if let Some(fmt) = &args.fmt {
        let fields = values.iter().map(OwnedArg::as_arg).collect::<Vec<Arg<'_>>>();
        append(&mut pdu, fmt, &fields).map_err(|err| pdu_error("encode failed", err))?;
    }
    debug!(service = pdu.service(), opcode = pdu.opcode(), len = pdu.len(), "composed PDU");
    Ok(())
}

/// Send until every byte is out, waiting for writability between attempts.
fn transmit(wbuf: &mut SendBuffer, stream: &mut IpcStream, timeout: Duration) -> CliResult<()> {
    while !wbuf.is_consumed() {
        let n = wbuf
            .send(stream)
            .map_err(|err| pdu_error("send failed", err))?;
        if n == 0
            && !stream
                .wait_writable(Some(timeout))
                .map_err(|err| transport_error("wait failed", err))?
        {
            return Err(CliError::new(
                TIMEOUT,
                format!(
                    "send stalled after {} of {} bytes",
                    wbuf.sent(),
                    wbuf.total()
                ),
            ));
        }
    }
    Ok(())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else {
        (input.strip_suffix('s').unwrap_or(input), false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input:?}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
