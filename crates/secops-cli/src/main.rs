mod bindings;
mod jobs;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::bindings::BindingsCommands;
use crate::jobs::JobsCommands;

#[derive(Debug, Parser)]
#[command(name = "secops-cli")]
#[command(about = "Operator tooling for the integration collection engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Inspect and edit scheduled collection jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Inspect customer integration bindings
    Bindings {
        #[command(subcommand)]
        command: BindingsCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("secops-cli: no command given; run with --help");
        return Ok(());
    };

    let config = secops_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = secops_db::PoolConfig::from_app_config(&config);
    let pool = secops_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = secops_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Jobs { command } => match command {
            JobsCommands::List => jobs::run_jobs_list(&pool).await?,
            JobsCommands::SetInterval { job_id, minutes } => {
                jobs::run_jobs_set_interval(&pool, &job_id, minutes).await?;
            }
            JobsCommands::Run { job_id, json } => {
                jobs::run_jobs_run(&pool, &config, &job_id, json).await?;
            }
        },
        Commands::Bindings { command } => match command {
            BindingsCommands::List { integration } => {
                bindings::run_bindings_list(&pool, &integration).await?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests;
