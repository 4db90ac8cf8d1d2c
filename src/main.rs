#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use crate::command::serve;
use crate::configuration::{Configuration, ObservabilityConfig};
use argh::FromArgs;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

mod command;
mod configuration;
mod discovery;
mod metrics_provider;
mod server;
mod upstream;

fn set_tracing(config: Option<ObservabilityConfig>) -> Result<(), configuration::Error> {
    if let Some(ObservabilityConfig {
        tracing: Some(tracing_config),
    }) = config
    {
        let resource = Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
            .build();
        let otlp_exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&tracing_config.endpoint)
            .with_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(otlp_exporter)
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .with_sampler(Sampler::TraceIdRatioBased(tracing_config.sampling_rate))
            .build();

        let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));
        let _ = global::set_tracer_provider(tracer_provider);
        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

        let _ = tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().json())
            .with(telemetry)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    }
    Ok(())
}

#[derive(FromArgs, PartialEq, Debug)]
/// Republishes the Kubernetes service account issuer discovery document and its keys
struct GlobalArguments {
    #[argh(option, short = 'c')]
    /// the path to an optional TOML configuration file
    config: Option<String>,

    #[argh(option)]
    /// the address to listen on, defaults to `localhost:8080`
    listen: Option<String>,

    #[argh(option)]
    /// the path to a kubeconfig file, in-cluster credentials are used when absent
    kubeconfig: Option<String>,
}

impl GlobalArguments {
    fn load_configuration(&self) -> Result<Configuration, configuration::Error> {
        let mut config = match &self.config {
            Some(path) => Configuration::load(path)?,
            None => Configuration::default(),
        };

        if let Some(listen) = &self.listen {
            config.server.listen.clone_from(listen);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.upstream.kubeconfig = Some(kubeconfig.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), command::Error> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cli_args: GlobalArguments = argh::from_env();
    let config = cli_args.load_configuration()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime")
        .block_on(run_command(config))
}

async fn run_command(config: Configuration) -> Result<(), command::Error> {
    set_tracing(config.observability.clone())?;

    let shutdown = CancellationToken::new();
    let command = serve::Command::new(&config).inspect_err(|error| {
        error!("Failed to initialize: {error}");
    })?;

    let signals = tokio::spawn(serve::cancel_on_signal(shutdown.clone()));
    let result = command.run(shutdown).await;

    signals.abort();
    if let Ok(Err(error)) = signals.await {
        error!("Failed to listen for termination signals: {error}");
    }

    if result.is_ok() {
        info!("Exiting");
    }
    result
}
