use std::{process, sync::Arc};

use revalidator::{
    application::{emitter::ChangeEmitter, error::AppError, invalidator::Invalidator},
    cache::{CacheConfig, CacheState, RenderCache},
    config,
    domain::changes::{ChangeDescriptor, EntityType, Operation},
    infra::{
        error::InfraError,
        http::{self, AppState, OriginProxy},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Notify(args) => run_notify(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache_state = CacheState::new(cache_config.clone());
    let render_cache: Arc<dyn RenderCache> = cache_state.store.clone();

    let invalidator = Arc::new(Invalidator::new(
        render_cache,
        settings.revalidate.secret.clone(),
    ));
    let origin = OriginProxy::from_settings(&settings.origin)?;

    match origin.as_ref() {
        Some(origin) => info!(origin = %origin.base(), "Proxying page requests to origin"),
        None => warn!("No origin configured; only the revalidation endpoints are served"),
    }

    let state = AppState {
        invalidator,
        cache: cache_config.enable_response_cache.then_some(cache_state),
        origin,
    };

    serve_http(&settings, state).await
}

async fn run_notify(settings: config::Settings, args: config::NotifyArgs) -> Result<(), AppError> {
    let emitter = ChangeEmitter::new(&settings.revalidate)?;
    let entity = EntityType::parse(&args.collection);
    let key = args.slug.unwrap_or_else(|| entity.as_str().to_string());
    let operation = if args.delete {
        Operation::Delete
    } else {
        Operation::Update
    };

    let change = ChangeDescriptor::new(entity, key, operation)?;
    let delivery = emitter.deliver(&change).await?;

    if delivery.is_partial() {
        warn!(
            change = %change,
            failed = ?delivery.failed,
            revalidated = ?delivery.revalidated,
            "Revalidation partially failed"
        );
    } else {
        info!(change = %change, paths = ?delivery.revalidated, "Revalidation delivered");
    }

    Ok(())
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Listening");

    let server =
        axum::serve(listener, router.into_make_service()).with_graceful_shutdown(shutdown_signal());
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "Graceful shutdown timed out");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
