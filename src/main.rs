mod cli;

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use isotrace::aggregate::Aggregator;
use isotrace::assembly::{Assembler, FlowKey};
use isotrace::capture;
use isotrace::config;
use isotrace::protocol;
use isotrace::report;
use isotrace::stream::IsoStreamFactory;

fn main() {
    let args = cli::Cli::parse();
    init_logging(args.verbose);

    let config = load_config(&args).unwrap_or_else(|err| fatal(&err.to_string()));
    if let Err(err) = run_analysis(&config) {
        fatal(&err.to_string());
    }
}

/// Map `-v` repetitions onto a log level and install the subscriber.
fn init_logging(verbose: u8) {
    use tracing::Level;

    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();
}

/// Report an unrecoverable error and end the process with a failing status.
fn fatal(msg: &str) -> ! {
    eprintln!("isotrace: {}", msg);
    std::process::exit(1);
}

/// Drive a full run: open the capture, feed TCP segments to the assembler,
/// flush, snapshot, export and report.
fn run_analysis(config: &RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pcap_path = config
        .capture
        .pcap_path
        .as_deref()
        .ok_or(capture::engine::CaptureError::EmptyPath)?;

    let fw_ip: IpAddr = config
        .network
        .fw_ip
        .parse()
        .map_err(|_| format!("invalid firewall address: {:?}", config.network.fw_ip))?;

    let mut cap = capture::engine::open_offline(pcap_path)?;

    tracing::info!(
        pcap = %pcap_path.display(),
        fw_ip = %fw_ip,
        max_csv_rows = config.limits.max_csv_rows,
        "analysis started"
    );

    let agg = Arc::new(Aggregator::new(config.limits.max_csv_rows));
    let factory = IsoStreamFactory::new(fw_ip, agg.clone());
    let mut assembler = Assembler::new(factory);

    let mut total_packets: u64 = 0;
    let mut payload_packets: u64 = 0;

    loop {
        let packet = match cap.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                tracing::error!(error = %e, "capture read error");
                return Err(Box::new(e));
            }
        };

        total_packets += 1;

        let decoded = match protocol::decode_packet(packet.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::trace!(error = %e, "skipping undecodable packet");
                continue;
            }
        };

        let Some(net) = decoded.net else { continue };
        if net.is_late_fragment() {
            continue;
        }
        let Some(tcp) = decoded.tcp else { continue };

        if !tcp.payload().is_empty() {
            payload_packets += 1;
        }

        let key = FlowKey {
            src_ip: net.src_ip(),
            dst_ip: net.dst_ip(),
            src_port: tcp.src_port(),
            dst_port: tcp.dst_port(),
        };
        assembler.assemble(key, tcp.sequence_number(), tcp.syn(), tcp.payload());
    }

    // Close every stream and wait for the handlers to drain.
    assembler.flush_all();

    let snapshot = agg.snapshot();

    if let Some(path) = &config.output.input_csv {
        report::write_rows_csv(path, &snapshot.input_rows, config.output.write_header)?;
        tracing::debug!(path = %path.display(), rows = snapshot.input_rows.len(), "input CSV written");
    }
    if let Some(path) = &config.output.output_csv {
        report::write_rows_csv(path, &snapshot.output_rows, config.output.write_header)?;
        tracing::debug!(path = %path.display(), rows = snapshot.output_rows.len(), "output CSV written");
    }

    report::print_summary(total_packets, payload_packets, &snapshot);

    Ok(())
}

#[derive(Debug, Clone)]
struct RuntimeConfig {
    capture: config::CaptureConfig,
    network: config::NetworkConfig,
    limits: config::LimitsConfig,
    output: config::OutputConfig,
}

fn load_config(args: &cli::Cli) -> Result<RuntimeConfig, config::ConfigError> {
    let base = match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };

    let mut capture = base.capture.clone();
    let mut network = base.network.clone();
    let mut limits = base.limits.clone();
    let mut output = base.output.clone();

    if let Some(value) = &args.read {
        capture.pcap_path = non_empty(value.clone());
    }
    if let Some(value) = &args.fw_ip {
        network.fw_ip = value.clone();
    }
    if let Some(value) = args.max_rows {
        limits.max_csv_rows = value;
    }
    if let Some(value) = &args.input_csv {
        output.input_csv = non_empty(value.clone());
    }
    if let Some(value) = &args.output_csv {
        output.output_csv = non_empty(value.clone());
    }
    if args.write_header {
        output.write_header = true;
    }

    Ok(RuntimeConfig {
        capture,
        network,
        limits,
        output,
    })
}

fn non_empty(path: PathBuf) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}
