use std::process::ExitCode;

fn main() -> ExitCode {
    packfill_cli::run()
}
