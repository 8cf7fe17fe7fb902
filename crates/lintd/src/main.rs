use std::process::ExitCode;

use lintd::{initialise_telemetry, run_daemon};
use lintd_config::Config;

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => error.exit(),
    };
    if let Err(error) = initialise_telemetry(&config) {
        eprintln!("lintd: {error}");
        return ExitCode::FAILURE;
    }
    match run_daemon(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "lintd", %error, "daemon exited with error");
            ExitCode::FAILURE
        }
    }
}
