//! Resultflow CLI: count, dump, merge and check large JSON result sets.

use anyhow::Result;
use clap::Parser;
use resultflow::engine::arg_parser::Cli;
use resultflow::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
