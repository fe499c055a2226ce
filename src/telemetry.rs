//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,studymate_backend=debug,normalizer=debug,tower_http=info,axum=info").
//! - LOG_FORMAT selects "pretty" (default), "compact" single-line, or "json" structured logs.
//!
//! Notes:
//! - We include targets in the output to disambiguate sources (`normalizer`,
//!   `identity` and `session` are used alongside the crate target).
//! - Tower HTTP TraceLayer still adds per-request spans; this complements it.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,studymate_backend=debug,normalizer=debug,identity=info,session=info,tower_http=info,axum=info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
        EnvFilter::new(DEFAULT_FILTER)
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // One init per format; the builder types differ.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        Ok("compact") => {
            builder.compact().init();
        }
        _ => {
            builder.init();
        }
    }
}
