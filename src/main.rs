use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tracelens::{report, Analyzer, CaptureReader};

#[derive(Parser, Debug)]
#[command(
    name = "tracelens",
    about = "Offline pcap trace analysis: TCP connection statistics and traceroute reconstruction",
    version
)]
struct Args {
    /// Capture file to analyze (.pcap, .cap, or gzipped)
    file: PathBuf,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let reader = CaptureReader::open(&args.file)
        .with_context(|| format!("opening {}", args.file.display()))?;
    let analysis = Analyzer::run(reader).context("analyzing capture")?;
    let report = report::render(&analysis);

    match &args.output {
        Some(path) => fs::write(path, report)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => print!("{report}"),
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
