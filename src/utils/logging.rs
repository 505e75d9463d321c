//! Tracing subscriber setup for the binary

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Log level for a `-v` count: warnings by default, then info, then debug
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Install a stderr subscriber. Later calls are no-ops.
pub fn init_logging(verbosity: u8) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_for(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    // a subscriber may already be installed (tests, embedding)
    let _ = tracing::subscriber::set_global_default(subscriber);
}
