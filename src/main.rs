use clap::Parser;
use sortify::cli::{Cli, config_path, run_cli};
use sortify::logging::init_logging;
use sortify::output::{OutputFormatter, Tone};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = config_path(&cli)
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));
    let _guard = init_logging(cli.verbose, log_dir.as_deref());

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::status(Tone::Failed, &format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
