//! Logger bootstrap shared by every binary.

/// Initializes `env_logger` at `Info`, letting `RUST_LOG` override the level.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
