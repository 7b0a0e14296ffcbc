use once_cell::sync::Lazy;
use regex::Regex;
use sentry::{ClientInitGuard, ClientOptions};
use std::env;
use std::sync::Arc;
use tracing::info;

// Compiled once, used for every outgoing event
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("Invalid email regex pattern")
});
static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("Invalid UUID regex pattern")
});
static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("Invalid IPv4 regex pattern")
});

/// Initialize Sentry crash reporting
///
/// # Environment Variables
/// - `SENTRY_DSN`: Sentry Data Source Name (required)
/// - `SENTRY_ENVIRONMENT`: Environment name (default: "development")
/// - `SENTRY_RELEASE`: Release version (default: from Cargo.toml)
///
/// The returned guard must be kept alive for the lifetime of the process.
pub fn init() -> Option<ClientInitGuard> {
    let dsn = match env::var("SENTRY_DSN").ok() {
        Some(d) if !d.is_empty() => d,
        _ => {
            info!("Sentry DSN not configured - crash reporting disabled");
            return None;
        }
    };

    let environment = env::var("SENTRY_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let release = env::var("SENTRY_RELEASE").unwrap_or_else(|_| {
        format!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    });

    let guard = sentry::init((
        dsn,
        ClientOptions {
            release: Some(release.into()),
            environment: Some(environment.into()),
            attach_stacktrace: true,
            send_default_pii: false,
            before_send: Some(Arc::new(before_send_filter)),
            ..Default::default()
        },
    ));

    info!(
        "Sentry crash reporting initialized (environment: {})",
        guard.options().environment.as_deref().unwrap_or("unknown")
    );

    Some(guard)
}

/// Scrub addresses and identifiers before an event leaves the machine.
/// Order contents never reach Sentry; only error text does.
fn before_send_filter(mut event: sentry::protocol::Event<'static>) -> Option<sentry::protocol::Event<'static>> {
    if let Some(message) = event.message.as_mut() {
        *message = strip_pii_from_message(message);
    }

    for exception in &mut event.exception.values {
        if let Some(value) = exception.value.as_mut() {
            *value = strip_pii_from_message(value);
        }
    }

    for breadcrumb in &mut event.breadcrumbs.values {
        if let Some(message) = breadcrumb.message.as_mut() {
            *message = strip_pii_from_message(message);
        }
    }

    event.tags.insert("relay_version".into(), env!("CARGO_PKG_VERSION").into());
    event.tags.insert("platform".into(), std::env::consts::OS.into());

    Some(event)
}

fn strip_pii_from_message(message: &str) -> String {
    let cleaned = EMAIL_REGEX.replace_all(message, "[EMAIL_REDACTED]");
    let cleaned = UUID_REGEX.replace_all(&cleaned, "[UUID_REDACTED]");
    IPV4_REGEX.replace_all(&cleaned, "[IP_REDACTED]").into_owned()
}

/// Report a print job that failed after the printer probed reachable.
/// A no-op when Sentry is not initialized.
pub fn capture_print_failure(error: &str) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("event_type", "print_job_failure");
        },
        || {
            sentry::capture_message(
                &format!("Print job failed: {}", strip_pii_from_message(error)),
                sentry::Level::Error,
            );
        },
    );
}
