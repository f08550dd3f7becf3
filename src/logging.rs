use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_VAR: &str = "CONCIERGE_LOG";

/// Picks the filter directives: `CONCIERGE_LOG`, then `RUST_LOG`, then a
/// default that keeps this crate and the calling binary at debug.
fn filter_directives(component: &str, concierge_log: Option<String>, rust_log: Option<String>) -> String {
    [concierge_log, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| format!("info,ai_concierge=debug,{component}=debug"))
}

pub fn init_tracing(component: &str) {
    let directives = filter_directives(
        component,
        std::env::var(LOG_VAR).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}
