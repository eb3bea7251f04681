use pdubuf_pdu::{PduConfig, PduError, ReceiveBuffer};
use pdubuf_transport::UnixDomainSocket;
use tracing::{debug, info};

use crate::cmd::ListenArgs;
use crate::exit::{pdu_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::fields::decode;
use crate::output::{print_pdu, OutputFormat, PduReport};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = PduConfig {
        max_payload_len: args.max_payload,
        ..PduConfig::default()
    };
    let mut rbuf =
        ReceiveBuffer::with_config(&config).map_err(|err| pdu_error("invalid --max-payload", err))?;

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let mut stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    match stream.peer_credentials() {
        Some(peer) => info!(pid = peer.pid, uid = peer.uid, gid = peer.gid, "peer connected"),
        None => info!("peer connected"),
    }

    let mut received = 0usize;
    while args.count.is_none_or(|count| received < count) {
        match rbuf.recv_from(&mut stream) {
            Ok(_) => {}
            Err(PduError::ConnectionClosed) if rbuf.is_empty() => {
                debug!(received, "peer closed connection");
                return match args.count {
                    Some(count) => Err(CliError::new(
                        FAILURE,
                        format!("connection closed after {received} of {count} PDUs"),
                    )),
                    None => Ok(SUCCESS),
                };
            }
            Err(err) => return Err(pdu_error("receive failed", err)),
        }
        if !rbuf.has_complete_pdu() {
            continue;
        }

        let fds = rbuf.take_fds();
        if let Some(pdu) = rbuf.pdu() {
            let fields = match &args.fmt {
                Some(fmt) => Some(decode(&pdu, fmt, &args.mem_lens)?.0),
                None => None,
            };
            print_pdu(
                &PduReport {
                    event: "received",
                    pdu,
                    fields: fields.as_deref(),
                    fds: fds.len(),
                },
                format,
            );
        }
        drop(fds);
        rbuf.clear();
        received += 1;
    }

    Ok(SUCCESS)
}
