/// Plainflow command line
///
/// Checks, formats and runs workflow files.

use plainflow_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
