//! Warden authority server binary.
//!
//! `serve` runs the HTTP API; `migrate` only brings the schema up to date.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_api::config::ApiConfig;
use warden_core::Authority;
use warden_core::auth::hooks::{HookPipeline, TracingHook};
use warden_core::clock::SystemClock;
use warden_core::store::PgAuthStore;

const DEFAULT_LOG_FILTER: &str = "info,warden_api=debug,warden_core=debug";

#[derive(Parser, Debug)]
#[command(name = "warden_server", about = "Warden credential and session authority")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations, then serve the HTTP API until Ctrl-C.
    Serve {
        /// Port to listen on. Overrides the port in `BIND_ADDR`.
        #[arg(long)]
        port: Option<u16>,

        #[command(flatten)]
        db: DbArgs,
    },
    /// Apply pending migrations and exit.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(Args, Debug)]
struct DbArgs {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "WARDEN_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let mut config = ApiConfig::from_env()?;

    match cli.command {
        Command::Migrate { db } => {
            let pool = connect(&mut config, &db).await?;
            info!("running database migrations");
            warden_api::migrate(&pool).await?;
            info!("migrations complete");
            Ok(())
        }
        Command::Serve { port, db } => {
            if let Some(port) = port {
                let host = config
                    .bind_addr
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "127.0.0.1".into());
                config.bind_addr = format!("{host}:{port}");
            }
            let pool = connect(&mut config, &db).await?;
            info!("running database migrations");
            warden_api::migrate(&pool).await?;
            serve(config, pool).await
        }
    }
}

async fn connect(config: &mut ApiConfig, db: &DbArgs) -> Result<PgPool, sqlx::Error> {
    if let Some(url) = &db.database_url {
        config.pg_connection_url = url.clone();
    }
    info!(max_connections = db.max_connections, "configuring connection pool");
    PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await
}

async fn serve(config: ApiConfig, pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let hooks = HookPipeline::empty().with(Arc::new(TracingHook));
    let authority = Authority::new(
        config.authority,
        Arc::new(PgAuthStore::new(pool)),
        Arc::new(SystemClock),
        hooks,
    )?;

    let bind_addr = config.bind_addr.clone();
    let state = warden_api::AppState {
        authority: Arc::new(authority),
    };
    let app = warden_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "warden API listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("server stopped");
    Ok(())
}
