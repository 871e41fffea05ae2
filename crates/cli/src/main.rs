use std::process::ExitCode;

fn main() -> ExitCode {
    protogas_cli::run()
}
