use std::process::ExitCode;

fn main() -> ExitCode {
    payrelay_cli::run()
}
