use std::{process, sync::Arc, time::Duration};

use specchio::{
    application::{
        admin::AdminCacheService,
        error::AppError,
        registry::{CacheRegistry, RegistryConfig},
        repos::{CacheItemsRepo, CachePointsRepo},
        sync::SyncPublisher,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        fs::{PathResolver, RootMount},
        http::{self, AdminState, DbHealth},
        publish::{NullPublisher, RemotePublisher},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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
        config::Command::Migrations(_) => run_migrations(settings).await,
    }
}

async fn run_migrations(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    drop(repositories);
    info!(target = "specchio::migrations", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let registry = build_registry(repositories.clone(), &settings)?;

    for seed in &settings.cache.points {
        registry
            .register_cache_path(&seed.url, &seed.source_path, &seed.version)
            .await?;
        registry.activate_cache_point(&seed.url).await?;
        info!(
            target = "specchio::startup",
            url = %seed.url,
            "cache point activated from configuration"
        );
    }

    let admin_state = AdminState {
        admin: Arc::new(AdminCacheService::new(registry)),
        health: repositories as Arc<dyn DbHealth>,
        page_size: settings.cache.admin_page_size,
    };

    serve_http(&settings, admin_state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_registry(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<Arc<CacheRegistry>, AppError> {
    let mounts = settings
        .roots
        .iter()
        .map(|root| RootMount {
            kind: root.kind,
            url_prefix: root.url_prefix.clone(),
            dir: root.dir.clone(),
        })
        .collect();
    let resolver = Arc::new(PathResolver::new(mounts).map_err(AppError::from)?);

    let publisher: Arc<dyn SyncPublisher> = match settings.remote.endpoint.as_ref() {
        Some(endpoint) => Arc::new(
            RemotePublisher::new(endpoint.clone(), settings.remote.timeout)
                .map_err(|err| AppError::unexpected(err.to_string()))?,
        ),
        None => Arc::new(NullPublisher),
    };

    let config = RegistryConfig {
        sync_limit: settings.cache.sync_limit,
        freshness_ttl: time::Duration::seconds(
            settings.cache.freshness_ttl.as_secs().min(i64::MAX as u64) as i64,
        ),
    };

    let points: Arc<dyn CachePointsRepo> = repositories.clone();
    let items: Arc<dyn CacheItemsRepo> = repositories;
    Ok(Arc::new(CacheRegistry::new(
        points, items, resolver, publisher, config,
    )))
}

async fn serve_http(settings: &config::Settings, admin_state: AdminState) -> Result<(), AppError> {
    let admin_router = http::build_admin_router(admin_state);

    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "specchio::startup",
        addr = %settings.server.admin_addr,
        "admin service listening"
    );

    let shutdown_grace = settings.server.graceful_shutdown;
    axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_grace))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        error!(target = "specchio::startup", "failed to install ctrl-c handler");
        return;
    }
    info!(
        target = "specchio::startup",
        grace_seconds = grace.as_secs(),
        "shutdown signal received; draining connections"
    );
}
