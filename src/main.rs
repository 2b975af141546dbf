//! report-server: binds the report API to the configured address.

use report_api::{app, ensure_data_set_tables, AppState, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("report_api=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(
        host = %settings.database.display_host(),
        max_connections = settings.database.max_connections,
        "connecting to database"
    );
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect_with(settings.database.connect_options()?)
        .await?;
    ensure_data_set_tables(&pool).await?;

    let addr = settings.socket_addr();
    let router = app(AppState::new(pool, settings))?;
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("report API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
