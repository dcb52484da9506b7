use log::LevelFilter;

pub fn to_level_filter(ulevel: u64) -> LevelFilter {
    match ulevel {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Install the global logger. `RUST_LOG` takes precedence over the numeric level.
pub fn init(ulevel: u64) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(to_level_filter(ulevel));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // a second init (tests, embedding) keeps the first logger
    let _ = builder.try_init();
}
