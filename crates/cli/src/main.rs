fn main() {
    if let Err(error) = xqdb_cli::run() {
        // Tracing is initialized inside run() after argument parsing.
        tracing::error!(error = format!("{error:#}"), "command failed");
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
