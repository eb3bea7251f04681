mod cmd;
mod exit;
mod fields;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pdubuf", version, about = "Send and receive service/opcode PDUs over Unix sockets")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", env = "PDUBUF_LOG", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_fields() {
        let cli = Cli::try_parse_from([
            "pdubuf", "send", "/tmp/test.sock", "--service", "1", "--opcode", "2", "--fmt", "cI",
            "--arg", "-5", "--arg", "1000",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!((args.service, args.opcode), (1, 2));
        assert_eq!(args.args, vec!["-5", "1000"]);
    }

    #[test]
    fn field_values_need_a_descriptor() {
        let err = Cli::try_parse_from([
            "pdubuf", "send", "/tmp/test.sock", "-s", "1", "-o", "2", "--arg", "7",
        ])
        .expect_err("--arg without --fmt should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn service_must_fit_a_byte() {
        let err = Cli::try_parse_from(["pdubuf", "send", "/tmp/test.sock", "-s", "256", "-o", "0"])
            .expect_err("out-of-range service should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_listen_subcommand() {
        let cli = Cli::try_parse_from([
            "pdubuf", "--format", "json", "listen", "/tmp/test.sock", "--count", "2", "--fmt", "M",
            "--mem-len", "3",
        ])
        .expect("listen args should parse");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.count, Some(2));
        assert_eq!(args.mem_lens, vec![3]);
    }
}
