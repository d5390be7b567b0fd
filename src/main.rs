use std::{process, sync::Arc};

use nebula::{
    application::{
        error::AppError,
        posts::PostService,
        repos::{HealthRepo, PostsRepo, PostsWriteRepo, UsersRepo, UsersWriteRepo},
        users::UserService,
    },
    cache::CacheState,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState, RouterState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use tokio::sync::Notify;
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

/// Storage handles shared by the services, all backed by one adapter.
struct Repositories {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    users: Arc<dyn UsersRepo>,
    users_write: Arc<dyn UsersWriteRepo>,
    health: Arc<dyn HealthRepo>,
}

impl Repositories {
    fn from_adapter<R>(adapter: Arc<R>) -> Self
    where
        R: PostsRepo + PostsWriteRepo + UsersRepo + UsersWriteRepo + HealthRepo + 'static,
    {
        Self {
            posts: adapter.clone(),
            posts_write: adapter.clone(),
            users: adapter.clone(),
            users_write: adapter.clone(),
            health: adapter,
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let router_state = build_router_state(repositories, &settings);
    serve_http(&settings, router_state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::unexpected(
            "migrate needs a database URL (--database-url or NEBULA__DATABASE__URL)",
        )
    })?;

    let pool = connect_pool(url, &settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    info!(target = "nebula::migrate", "migrations applied");
    Ok(())
}

async fn connect_pool(url: &str, settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    PostgresRepositories::connect(
        url,
        settings.database.max_connections.get(),
        settings.database.connect_retries,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(url) = settings.database.url.as_deref() else {
        warn!(
            target = "nebula::serve",
            "no database URL configured; data lives in process memory and is lost on exit"
        );
        return Ok(Repositories::from_adapter(Arc::new(InMemoryRepositories::new())));
    };

    let pool = connect_pool(url, settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!(target = "nebula::serve", "database ready");

    Ok(Repositories::from_adapter(Arc::new(PostgresRepositories::new(pool))))
}

fn build_router_state(repositories: Repositories, settings: &config::Settings) -> RouterState {
    let Repositories {
        posts,
        posts_write,
        users,
        users_write,
        health,
    } = repositories;

    let rate_limiter = settings.rate_limit.enabled.then(|| {
        Arc::new(ApiRateLimiter::new(
            std::time::Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
            settings.rate_limit.max_requests.get(),
        ))
    });

    RouterState {
        api: ApiState {
            posts: Arc::new(PostService::new(posts, posts_write, users.clone())),
            users: Arc::new(UserService::new(users, users_write)),
            pagination: settings.pagination.bounds(),
            cache: CacheState::new(settings.output_cache_config()),
            rate_limiter,
        },
        health,
    }
}

async fn serve_http(
    settings: &config::Settings,
    router_state: RouterState,
) -> Result<(), AppError> {
    let router = http::build_router(router_state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "nebula::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { signal.notified().await })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        signal = tokio::signal::ctrl_c() => signal.map_err(InfraError::from)?,
    }

    info!(target = "nebula::serve", "shutdown requested, draining connections");
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "nebula::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}
