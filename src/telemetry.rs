use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::Sampler, Resource};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::AppConfig;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Set once the OTLP pipeline is installed; read by `/health`.
static OTLP_EXPORTER: OnceCell<bool> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub otlp_endpoint: Option<String>,
    pub enable_tracing: bool,
}

impl TelemetryConfig {
    /// Service identity from the app section; exporter settings from the
    /// standard `OTEL_*` variables.
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            service_name: app.name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: app.environment.as_str().to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty()),
            enable_tracing: std::env::var("OTEL_TRACES_ENABLED")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(true),
        }
    }
}

pub struct TelemetryHandles {
    otlp_installed: bool,
}

impl TelemetryHandles {
    /// Flushes pending spans before exit.
    pub async fn shutdown(self) -> Result<()> {
        if self.otlp_installed {
            info!("Flushing OTLP tracer");
            global::shutdown_tracer_provider();
        }
        Ok(())
    }
}

/// Installs the fmt subscriber and, when an endpoint is configured, the OTLP
/// batch tracer.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryHandles> {
    init_subscriber()?;

    info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        "Initializing telemetry"
    );

    let otlp_installed = match (&config.otlp_endpoint, config.enable_tracing) {
        (Some(endpoint), true) => {
            install_otlp_tracer(&config, endpoint)?;
            info!(%endpoint, "OTLP tracing enabled");
            true
        }
        _ => {
            info!("OTLP tracing disabled; logging to stdout only");
            false
        }
    };
    let _ = OTLP_EXPORTER.set(otlp_installed);

    Ok(TelemetryHandles { otlp_installed })
}

fn install_otlp_tracer(config: &TelemetryConfig, endpoint: &str) -> Result<()> {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(EXPORT_TIMEOUT),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_resource(resource)
                .with_sampler(Sampler::AlwaysOn),
        )
        .install_batch(runtime::Tokio)
        .context("Failed to initialize OTLP tracer")?;

    Ok(())
}

fn init_subscriber() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into());

    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

pub fn telemetry_health_check() -> HashMap<String, bool> {
    let mut health = HashMap::new();
    health.insert("subscriber".to_string(), true);
    health.insert(
        "otlp_exporter".to_string(),
        OTLP_EXPORTER.get().copied().unwrap_or(false),
    );
    health
}
