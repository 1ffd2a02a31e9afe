use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Structured logging for a gateway instance. `RUST_LOG` wins when set;
/// otherwise the service crate logs at debug and everything else at info.
/// `PULSE_ENV=production` switches the human-readable output to JSON lines.
pub fn init_tracing(service_name: &str) {
    let service_target = service_name.replace('-', "_");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{service_target}=debug")));

    let registry = tracing_subscriber::registry().with(filter);

    let production = std::env::var("PULSE_ENV").is_ok_and(|v| v == "production");
    if production {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }

    tracing::info!(service = service_name, json = production, "tracing initialized");
}
