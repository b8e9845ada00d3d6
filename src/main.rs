use std::process::ExitCode;

use guardgen::cli::CommandLineInterface;

fn main() -> ExitCode {
    let command_line_interface = CommandLineInterface::load();
    command_line_interface.init_tracing();
    match command_line_interface.run() {
        Ok(code) => code,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
