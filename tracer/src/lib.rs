//! Process-wide logging/tracing setup. OTLP export is feature-gated behind
//! `otel` so a plain embedded library build doesn't need a collector
//! reachable at startup; stdout/JSON logging is always on.
use tracing::subscriber::set_global_default;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[cfg(feature = "otel")]
fn otel_layer<S>(
    service_name: &'static str,
    otel_url: &str,
) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{
        trace::{self, Sampler},
        Resource,
    };

    tracing_opentelemetry::layer().with_tracer(
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(otel_url),
            )
            .with_trace_config(
                trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        service_name,
                    )])),
            )
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .expect("could not build otel pipeline"),
    )
}

/// Installs the global subscriber. `otel_url` is ignored unless the `otel`
/// feature is enabled.
pub fn init_tracing(service_name: &'static str, log_level: Option<&str>, otel_url: &str) {
    let env_filter = EnvFilter::new(log_level.unwrap_or("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().pretty();
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_level(true)
        .with_current_span(true)
        .with_thread_names(true);

    let subscriber = Registry::default().with(env_filter).with(json_layer);

    #[cfg(feature = "otel")]
    {
        let subscriber = subscriber
            .with(stdout_layer)
            .with(otel_layer(service_name, otel_url));
        set_global_default(subscriber).expect("failed to set default subscriber");
    }

    #[cfg(not(feature = "otel"))]
    {
        let _ = (service_name, otel_url);
        set_global_default(subscriber.with(stdout_layer))
            .expect("failed to set default subscriber");
    }
}

pub fn shutdown_tracing() {
    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {}
