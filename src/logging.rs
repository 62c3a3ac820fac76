//! Tracing setup for the daemon and the one-shot commands.
//!
//! The daemon is quiet by default; levels come from the settings file
//! and can be raised per module without touching the default:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! engine = "info"    # reconciliation decisions
//! store = "debug"    # every capture/restore
//! ```
//!
//! `RUST_LOG` takes precedence over both:
//! ```bash
//! RUST_LOG=debug attrsync start
//! ```

use std::sync::Once;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Full wall-clock timestamps. The daemon runs for days; time-of-day
/// alone stops being useful after the first midnight.
struct WallTime;

impl FormatTime for WallTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Flatten the logging config into an `EnvFilter` directive string:
/// the default level first, then per-module overrides in stable order.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut overrides: Vec<_> = config.modules.iter().collect();
    overrides.sort();

    let mut directives = config.default.clone();
    for (module, level) in overrides {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only the first
/// call takes effect).
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var_os("RUST_LOG").is_some() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_timer(WallTime)
            .with_target(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(layer).init();
    });
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("store", "captured", "{}", rel.display());
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("engine", "self-write suppressed", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
