// demos/sentry_cli.rs
//
// Minimal CLI demonstrating the validator: validate a single file and print
// its SecurityReport as JSON. Exits non-zero when the file is not safe.

use std::path::Path;
use std::process::ExitCode;
use stego_sentry::validate_file;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: sentry-cli <path> [original-name]");
            return ExitCode::FAILURE;
        }
    };
    let original_name = args
        .next()
        .unwrap_or_else(|| Path::new(&path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());

    let report = validate_file(Path::new(&path), &original_name);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("failed to serialize report: {e}");
            return ExitCode::FAILURE;
        }
    }

    if report.is_safe {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
