use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mmbi {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mmbi");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MMBI_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "ring_capacity_default: {}",
        mmbi_channel::DEFAULT_RING_CAPACITY
    );
    println!("frame_size_default: {}", mmbi_frame::DEFAULT_MAX_FRAME);
    println!("unix_datagram: {}", cfg!(unix));

    Ok(SUCCESS)
}
