//! IMG.LY Studio CLI Tool
//!
//! Command-line interface for turning product photos into studio shots with
//! the imgly-studio library.

#[cfg(feature = "cli")]
use imgly_studio::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
