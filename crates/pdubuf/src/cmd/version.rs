use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pdubuf {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pdubuf");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PDUBUF_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("PDUBUF_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "pdu: header={} max_payload={}",
        pdubuf_pdu::HEADER_SIZE,
        pdubuf_pdu::MAX_PAYLOAD
    );
    println!("byte_order: {}", if cfg!(target_endian = "little") { "little" } else { "big" });

    Ok(SUCCESS)
}
