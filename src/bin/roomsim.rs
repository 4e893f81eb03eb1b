use std::process::ExitCode;

use roomsim::runner::run_with_args;

fn main() -> ExitCode {
    match run_with_args() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("roomsim: {e}");
            ExitCode::FAILURE
        }
    }
}
