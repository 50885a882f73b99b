//! Funds settlement engine CLI
//!
//! Command-line interface for settling a batch of transfers, payments and
//! refunds from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts accounts.csv --rates rates.csv operations.csv > balances.csv
//! cargo run -- --accounts accounts.csv --open-rates-url https://open.er-api.com/v6 operations.csv
//! cargo run -- --accounts accounts.csv --rates rates.csv --batch-size 2000 --max-concurrent 8 operations.csv
//! RUST_LOG=funds_settlement_engine=debug cargo run -- --accounts accounts.csv operations.csv
//! ```
//!
//! Final account balances are written to stdout; logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use funds_settlement_engine::pipeline::SettlementPipeline;
use funds_settlement_engine::{cli, logging};
use std::process;
use tracing::error;

fn main() {
    let args = cli::parse_args();
    logging::init(&args.log_level);

    let pipeline = SettlementPipeline::new(
        args.to_batch_config(),
        args.to_settlement_config(),
        args.to_rate_sources(),
    );

    let mut output = std::io::stdout();
    if let Err(e) = pipeline.process(&args.accounts_file, &args.operations_file, &mut output) {
        error!(error = %e, "Settlement run failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
