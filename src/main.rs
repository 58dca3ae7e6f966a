use std::process;

use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};

use bgpd_rib::cli::{self, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (bgpd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgpd_rib"), bgpd_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", bgpd_level, other_level);

    if !cli::run(&args).await {
        process::exit(1);
    }
}
