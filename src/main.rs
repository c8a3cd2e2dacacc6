mod args;
mod recon;

use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose {
        Builder::new().filter_level(LevelFilter::Debug).init();
    } else {
        env_logger::init();
    }
    info!("main: args: {:?}", args);

    let res = recon::run_pipeline(
        &args.input,
        &args.out,
        &args.config,
        &args.reference_totals,
        &args.executives,
        &args.category_overrides,
        &args.reference,
    );

    match res {
        Ok(summary) => {
            println!(
                "valgrecon: {} payloads accepted, {} files failed, {} areas flagged, {} of {} checks failed. Output in {}",
                summary.payloads_accepted,
                summary.files_failed.len(),
                summary.flagged_areas.len(),
                summary.validation.failed,
                summary.validation.total,
                summary.output_directory
            );
        }
        Err(e) => {
            eprintln!("An error occured {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
