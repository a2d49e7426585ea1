fn main() {
    let args = std::env::args();
    // Initialize logging as early as possible; fallback to stderr on failure.
    let _ = wcadm::logging::init_logging(wcadm::logging::LogFormat::Human);

    if let Err(err) = wcadm::run(args) {
        eprintln!("wcadm error: {err}");
        std::process::exit(1);
    }
}
