use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracewarden_api::ApiServer;
use tracewarden_config::{PipelineConfig, ServerConfig, load_from_env, load_server_from_env};
use tracewarden_events::EventBus;
use tracewarden_pipeline::{
    CaptureSource, ConfigHandle, KubectlCaptureSource, PipelineContext, PipelineController,
    ProcessToolRunner, ToolRunner,
};
use tracewarden_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, init_logging};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the service.
pub(crate) struct BootstrapDependencies {
    pipeline: PipelineConfig,
    server: ServerConfig,
    events: EventBus,
    telemetry: Metrics,
    source: Arc<dyn CaptureSource>,
    runner: Arc<dyn ToolRunner>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let pipeline =
            load_from_env().map_err(|err| AppError::config("config.load_pipeline", err))?;
        let server =
            load_server_from_env().map_err(|err| AppError::config("config.load_server", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessToolRunner);
        let source: Arc<dyn CaptureSource> =
            Arc::new(KubectlCaptureSource::new(Arc::clone(&runner)));

        Ok(Self {
            pipeline,
            server,
            events: EventBus::new(),
            telemetry,
            source,
            runner,
        })
    }
}

/// Entry point for the service boot sequence.
///
/// # Errors
///
/// Returns an error if logging, configuration, or the API listener cannot be set up.
pub async fn run_app() -> AppResult<()> {
    let logging = LoggingConfig {
        build_sha: option_env!("TRACEWARDEN_BUILD_SHA").unwrap_or("dev"),
        ..LoggingConfig::default()
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("service");

    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence over injected dependencies; returns once `shutdown` resolves and
/// everything has drained.
pub(crate) async fn run_app_with<F>(
    dependencies: BootstrapDependencies,
    shutdown: F,
) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies {
        pipeline,
        server,
        events,
        telemetry,
        source,
        runner,
    } = dependencies;
    info!(
        namespace = %pipeline.source_namespace,
        flow_dir = %pipeline.flow_output_dir.display(),
        "tracewarden bootstrap starting"
    );

    let cancel = CancellationToken::new();
    let ctx = PipelineContext::new(events, telemetry.clone());
    let controller = Arc::new(PipelineController::new(
        ConfigHandle::new(pipeline),
        ctx,
        source,
        runner,
        cancel.clone(),
    ));
    let monitor = controller.spawn_monitor();
    let api = ApiServer::new(Arc::clone(&controller), telemetry);

    let signal_cancel = cancel.clone();
    let signal = tokio::spawn(async move {
        shutdown.await;
        info!("shutdown requested");
        signal_cancel.cancel();
    });

    let serve_result = api.serve(server.socket_addr(), cancel.clone()).await;
    if let Err(err) = &serve_result {
        error!(error = ?err, "control surface stopped with an error");
    }

    controller.shutdown().await;
    signal.abort();
    if let Err(err) = monitor.await {
        warn!(error = %err, "output directory monitor join failed");
    }

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("tracewarden stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
