//! Thin command-line entry point: parse arguments, run one mapping,
//! emit the map as JSON on stdout. Interactive use lives elsewhere;
//! this binary exists so the engine can be driven from scripts.

use anyhow::Context;
use clap::Parser;
use netmapper::{NetworkMapper, PortPreset, PortSelection, ScanOptions};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "netmapper", version, about = "Network discovery and fingerprinting engine")]
struct Args {
    /// Target spec: single address, range (a.b.c.d-N or a.b.c.d-e.f.g.h)
    /// or CIDR block
    target: String,

    /// Explicit ports to probe, e.g. "22,80,8000-8100"
    #[arg(short, long, conflicts_with = "preset")]
    ports: Option<String>,

    /// Named port preset
    #[arg(long, value_enum, default_value = "top")]
    preset: PresetArg,

    /// Probe timeout in milliseconds (applies to ping, connect and UDP
    /// reply waits)
    #[arg(short, long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Max in-flight discovery probes
    #[arg(long, default_value_t = 100)]
    ping_concurrency: usize,

    /// Max in-flight port probes per phase
    #[arg(long, default_value_t = 50)]
    port_concurrency: usize,

    /// Retries for the ambiguous UDP open|filtered state
    #[arg(long, default_value_t = 0)]
    udp_retries: u32,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PresetArg {
    /// Top ~20 commonly probed ports
    Top,
    /// Well-known range 1-1023
    WellKnown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    let ports = match &args.ports {
        Some(spec) => PortSelection::List(netmapper::ports::parse_port_spec(spec)?),
        None => PortSelection::Preset(match args.preset {
            PresetArg::Top => PortPreset::Top,
            PresetArg::WellKnown => PortPreset::WellKnown,
        }),
    };

    let timeout = Duration::from_millis(args.timeout_ms);
    let options = ScanOptions {
        ping_timeout: timeout,
        connect_timeout: timeout,
        udp_timeout: timeout,
        ping_concurrency: args.ping_concurrency,
        port_concurrency: args.port_concurrency,
        udp_retries: args.udp_retries,
        ports,
        ..ScanOptions::default()
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, returning partial results");
            signal_cancel.cancel();
        }
    });

    let mapper = NetworkMapper::new(options).with_cancellation(cancel);
    let map = mapper
        .create_map(&args.target)
        .await
        .context("mapping run failed")?;

    println!("{}", serde_json::to_string_pretty(&map)?);
    Ok(())
}
