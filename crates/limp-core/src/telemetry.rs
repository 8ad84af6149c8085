//! Log output for the `limp` binary.
//!
//! Records logged inside an episode carry the `limp.episode` span, so a batch
//! log can be split per episode id. JSON lines put the span's `episode_id`
//! and `config` next to the event fields, and a closing episode span logs its
//! busy and idle time.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "LIMP_LOG";

/// HTTP client crates stay at `warn` unless a filter variable says otherwise.
const QUIET: [&str; 4] = ["hyper", "h2", "reqwest", "rustls"];

/// Directives used when neither [`LOG_ENV`] nor `RUST_LOG` is set.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    if level > Level::WARN {
        directives.extend(QUIET.iter().map(|krate| format!("{krate}=warn")));
    }
    directives.join(",")
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Only the first call in a process takes
/// effect.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(filter(level));
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .ok();
    }
}
