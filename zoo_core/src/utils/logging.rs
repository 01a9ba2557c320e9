use log::LevelFilter;

/// Initialize logging using env_logger.
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `"info"`,
/// `"debug"`) applies, falling back to `info` for unknown names.
/// e.g., `RUST_LOG=zoo_core=debug zoo connect localhost:2181`
pub fn init_logging(default_level: &str) {
    let level = default_level.parse().unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    // A second call (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}
