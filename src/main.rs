//! langpref
//!
//! Command-line interface for locale preference detection and history.

use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match langpref::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Don't print if it's an empty error (e.g., from a clap parse failure)
            let msg = e.to_string();
            if !msg.is_empty() {
                eprintln!("Error: {e}");

                if matches!(e, langpref::Error::CorruptData { .. }) {
                    eprintln!();
                    eprintln!("Run 'langpref history verify' for details or 'langpref reset' to start over.");
                }
            }

            let code = e.exit_code();
            ExitCode::from(code as u8)
        },
    }
}
