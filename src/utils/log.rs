/// Initialise `env_logger` for the binary and for tests.
///
/// `RUST_LOG` controls the filter and defaults to `info`. Calling it more
/// than once keeps the first logger.
pub fn log_init() {
    use std::io::Write;
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .try_init();
}
