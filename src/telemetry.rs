//! Tracing setup for hosts embedding `chart-pilot`.
//!
//! Components only emit `tracing` events. A host either installs its own
//! subscriber or calls one of the helpers below with the `telemetry` feature.

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "chart_pilot=info";

/// Installs a compact stderr subscriber filtered by `RUST_LOG`, falling back
/// to [`DEFAULT_FILTER`].
///
/// Returns `false` when the feature is off or a global subscriber exists.
#[must_use]
pub fn init_default_tracing() -> bool {
    init_tracing(None)
}

/// Like [`init_default_tracing`], with `directive` taking precedence over
/// `RUST_LOG`.
#[must_use]
pub fn init_tracing(directive: Option<&str>) -> bool {
    #[cfg(feature = "telemetry")]
    {
        use tracing_subscriber::EnvFilter;

        let filter = match directive {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .is_ok()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = directive;
        false
    }
}
