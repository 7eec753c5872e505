mod args;
mod driver;

use clap::Parser;
use log::{info, LevelFilter};
use snafu::ErrorCompat;

use crate::args::{Args, Command};

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    info!("args: {:?}", args);

    let res = match args.command {
        Command::Tally {
            input,
            out,
            reference,
        } => driver::run_tally(&input, out, reference),
        Command::Rollover {
            config,
            state,
            group,
            interval,
            passes,
            now,
        } => driver::settings::DriverSettings::resolve(
            config, state, group, interval, passes, now,
        )
        .and_then(|settings| driver::run_rollover(&settings)),
    };

    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
