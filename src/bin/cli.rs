use std::path::PathBuf;

use clap::Parser;
use mpegts_demux::monitor::{run, Input, Options};
use mpegts_demux::{logging, DemuxConfig};

fn parse_pid(s: &str) -> Result<u16, String> {
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("bad PID {s:?}: {e}"))?;
    if v > 0x2000 {
        return Err(format!("PID {s} out of range"));
    }
    Ok(v)
}

#[derive(Parser)]
#[clap(about = "Software MPEG-TS demux with BBFRAME de-embedding")]
struct Opt {
    /// UDP socket to bind + listen (IPv4)
    #[clap(long, default_value = "239.1.1.2:1234")]
    addr: String,

    /// Read a capture file instead of listening on UDP
    #[clap(long)]
    file: Option<PathBuf>,

    /// Refresh interval for the JSON snapshot
    #[clap(long, default_value_t = 2)]
    refresh: u64,

    /// 188 or 204
    #[clap(long, default_value_t = 188)]
    packet_size: usize,

    /// JSON demux configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Follow the payload of a PID (repeatable, 0x prefix for hex)
    #[clap(long = "pid", value_parser = parse_pid)]
    pids: Vec<u16>,

    /// Reassemble sections on a PID (repeatable)
    #[clap(long = "section-pid", value_parser = parse_pid)]
    section_pids: Vec<u16>,

    /// Carrier PID holding BBFRAMEs
    #[clap(long, value_parser = parse_pid)]
    bbframe_pid: Option<u16>,

    /// Input stream identifier to de-embed from the carrier
    #[clap(long, default_value_t = 0)]
    isi: u8,

    /// Debug logging
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    logging::init_logging(opt.verbose)?;

    let config = match &opt.config {
        Some(path) => DemuxConfig::from_json_file(path)?,
        None => DemuxConfig::default(),
    };
    let input = match opt.file {
        Some(path) => Input::File(path),
        None => Input::Udp(opt.addr.parse()?),
    };

    run(Options {
        input,
        packet_size: opt.packet_size,
        refresh_secs: opt.refresh,
        config,
        pids: opt.pids,
        section_pids: opt.section_pids,
        bbframe: opt.bbframe_pid.map(|pid| (pid, opt.isi)),
    })
    .await
}
