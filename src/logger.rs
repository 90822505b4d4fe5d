use crate::error::Result;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Map the Bacula-style `debug_level` (0..=50) onto a tracing filter.
///
/// Higher numbers log more: 10 covers the invocation header, 20..=30
/// operational detail, 40+ full command transcripts.
fn filter_for(debug_level: u8) -> EnvFilter {
    let directive = match debug_level {
        0..=9 => "warn",
        10..=19 => "info",
        20..=39 => "debug",
        _ => "trace",
    };
    EnvFilter::new(directive)
}

pub fn init(debug_level: u8) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter_for(debug_level))
        .with(fmt_layer)
        .init();

    Ok(())
}
