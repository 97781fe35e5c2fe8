//! Structured logging bootstrap.
//!
//! `LOG_FORMAT=json` selects newline-delimited JSON records suitable for log
//! aggregation; anything else (including unset) selects a human-readable
//! text layer. The filter directive comes from `RUST_LOG`, falling back to
//! `info` when unset or invalid.
//!
//! The subscriber also carries a [`reload::Layer`] slot, initially empty, so
//! a layer that depends on runtime configuration (the admin notifier, which
//! needs a gateway client built during bootstrap) can be installed after the
//! fact without rebuilding the subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

/// Boxed form of whatever layer gets installed into the reload slot.
pub type DynLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle returned by [`init_logging`], used to install a layer into the
/// subscriber's reload slot after startup.
#[derive(Clone)]
pub struct LoggingHandle {
    reload_handle: reload::Handle<Option<DynLayer>, Registry>,
}

impl LoggingHandle {
    /// Install (or replace) the reloadable layer, e.g. the admin notifier
    /// once its gateway client exists.
    pub fn set_dynamic_layer<L>(&self, layer: L)
    where
        L: Layer<Registry> + Send + Sync + 'static,
    {
        let _ = self
            .reload_handle
            .reload(Some(Box::new(layer) as DynLayer));
    }
}

/// Initialize the global tracing subscriber from environment variables.
/// Call this once, at process startup, before any other tracing call.
pub fn init_logging() -> LoggingHandle {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => init_with_format(true),
        _ => init_with_format(false),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_with_format(json: bool) -> LoggingHandle {
    let (dynamic_layer, reload_handle) = reload::Layer::new(None::<DynLayer>);

    if json {
        let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .with(dynamic_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer())
            .with(dynamic_layer)
            .init();
    }

    LoggingHandle { reload_handle }
}

/// Initialize logging without consulting the environment, for tests and
/// binaries that want a deterministic default.
pub fn init_default_logging() {
    fmt().with_env_filter(EnvFilter::new("info")).init();
}
