use std::str::FromStr;
use std::sync::Mutex;

use slog::Drain;
use slog::{Fuse, LevelFilter};
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Level, Logger};

/// The level used when none is configured or the configured one is
/// not recognized.
pub const DEFAULT_LEVEL: Level = Level::Info;

/// Parses a level name such as `debug` or `warn`, falling back to
/// [`DEFAULT_LEVEL`].
pub fn parse_level(name: Option<&str>) -> Level {
    name.and_then(|n| Level::from_str(n.trim()).ok())
        .unwrap_or(DEFAULT_LEVEL)
}

/// Builds the root logger: JSON lines on stderr, written from a
/// background thread, tagged with the build metadata.
pub fn initialize_logger(level: Level) -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);

    #[cfg(feature = "env_logging")]
    let drain = slog_envlogger::new(drain);

    let drain = LevelFilter::new(drain, level).fuse();
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        slog::o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}
