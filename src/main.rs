use std::sync::Arc;

use anyhow::Context;

use backoffice::{app, config::AppConfig, db, schema, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "backoffice=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env().context("load configuration")?);
    let pool = db::connect(&config.database_url, &config.db).await?;

    // Must finish before any request can reach the user services.
    schema::ensure_user_type_category(&schema::PgSchemaStore::new(pool.clone()))
        .await
        .context("users schema evolution")?;

    let state = AppState::new(pool, config);
    app::serve(app::build_app(state)).await
}
