use clap::Parser;
use std::path::PathBuf;

/// isotrace: extract ISO-8583 messages from an offline TCP packet capture
#[derive(Parser, Debug)]
#[command(name = "isotrace", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Capture file to read (pcap/pcapng); overrides `capture.pcap_path`
    #[arg(short = 'r', long)]
    pub read: Option<PathBuf>,

    /// Firewall IP address used to classify message direction;
    /// overrides `network.fw_ip`
    #[arg(long)]
    pub fw_ip: Option<String>,

    /// Maximum rows kept per direction for CSV export;
    /// overrides `limits.max_csv_rows`
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Write input-direction rows to this CSV file
    #[arg(long)]
    pub input_csv: Option<PathBuf>,

    /// Write output-direction rows to this CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Emit a header row in CSV output
    #[arg(long, default_value_t = false)]
    pub write_header: bool,

    /// Increase log verbosity (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
