//! Logging setup, with optional Chrome tracing via `tracing-chrome`.
//!
//! When the `profiling` feature is enabled, [`init`] adds a Chrome trace
//! layer that writes to `trace.json` in the current directory. Open the
//! resulting file in `chrome://tracing` or [Perfetto](https://ui.perfetto.dev).
//! The extract and encode paths carry spans only in that build.

use tracing_subscriber::EnvFilter;

/// Guard that flushes the trace file on drop.
///
/// Hold this in `main()`; the trace is written when the guard is dropped.
#[cfg(feature = "profiling")]
pub struct ProfilingGuard {
    _guard: tracing_chrome::FlushGuard,
}

/// Zero-size guard when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub struct ProfilingGuard;

/// `RUST_LOG` if set, `default_level` otherwise.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber: formatted logs filtered by `RUST_LOG`
/// (default `info`), plus the Chrome layer when `profiling` is active.
///
/// Returns `Some(guard)` only in profiling builds; the caller must hold it
/// until the end of the program.
///
/// ```rust,ignore
/// let _guard = hubert_frontend::profiling::init();
/// // ... run workload ...
/// ```
pub fn init() -> Option<ProfilingGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    #[cfg(feature = "profiling")]
    {
        use tracing_chrome::ChromeLayerBuilder;

        let (chrome_layer, guard) = ChromeLayerBuilder::new()
            .file("trace.json")
            .include_args(true)
            .build();

        tracing_subscriber::registry()
            .with(env_filter("info"))
            .with(fmt_layer)
            .with(chrome_layer)
            .init();

        tracing::info!("Profiling enabled, trace will be written to trace.json");
        Some(ProfilingGuard { _guard: guard })
    }

    #[cfg(not(feature = "profiling"))]
    {
        tracing_subscriber::registry()
            .with(env_filter("info"))
            .with(fmt_layer)
            .init();
        None
    }
}

