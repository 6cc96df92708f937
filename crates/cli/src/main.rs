use std::process::ExitCode;

fn main() -> ExitCode {
    pactum_cli::run()
}
