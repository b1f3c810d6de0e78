//! Corkboard API server binary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use corkboard_core::calendar::google::GoogleCalendarClient;
use corkboard_core::calendar::oauth::OAuthStateStore;
use corkboard_core::calendar::{CalendarSyncService, PgBoardStore, TokenCodec};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "corkboard_server", about = "Corkboard API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/corkboard"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,corkboard_api=debug,corkboard_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = corkboard_api::config::ApiConfig::from_env();
    config.pg_connection_url = args.database_url;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }

    info!(?config, max_connections = args.max_connections, "starting corkboard_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    corkboard_api::migrate(&pool).await?;

    if !config.google_configured() {
        warn!("GOOGLE_CALENDAR_CLIENT_ID/SECRET not set, calendar connect is disabled");
    }

    let gateway = Arc::new(GoogleCalendarClient::new(
        config.google_oauth_config(),
        config.provider_timeout,
    )?);
    let sync = Arc::new(CalendarSyncService::new(
        Arc::new(PgBoardStore::new(pool)),
        gateway,
        TokenCodec::new(&config.token_encryption_key),
        config.sync_settings(),
    ));

    let oauth_states = Arc::new(OAuthStateStore::new());
    oauth_states.spawn_cleanup_task();

    let state = corkboard_api::AppState {
        sync,
        oauth_states,
        config: config.clone(),
    };
    let app = corkboard_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
