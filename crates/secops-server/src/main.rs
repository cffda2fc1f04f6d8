mod api;
mod middleware;
mod provisioning;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
    provisioning::Provisioner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = secops_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting secops-server");

    let pool_config = secops_db::PoolConfig::from_app_config(&config);
    let pool = secops_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = secops_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let services = scheduler::build_scheduler(pool.clone(), &config).await?;
    let provisioner = Arc::new(Provisioner::new(
        services.scheduler.clone(),
        Arc::clone(&services.jobs),
        Arc::clone(&services.registry),
        config.default_job_interval_minutes,
    ));

    let auth = AuthState::from_env(matches!(
        config.env,
        secops_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            pool,
            scheduler: services.scheduler.clone(),
            jobs: services.jobs,
            registry: services.registry,
            provisioner,
        },
        auth,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
