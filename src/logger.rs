//! Diagnostics logging: `LEVEL message`, no timestamps, written to stderr so
//! it never mixes with printed IR.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

pub fn init_with_level(level: Level) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_level(true)
        .compact()
        .with_filter(LevelFilter::from_level(level));

    // Keep whichever subscriber was installed first.
    let _ = Registry::default().with(layer).try_init();
}
