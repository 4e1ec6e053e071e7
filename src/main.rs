use std::process::ExitCode;

use txscope::config::DatabaseConfig;
use txscope::domain::schema;
use txscope::services::accounts::AccountService;
use txscope::services::error::LogErr;
use txscope::{Context, PgTransactionManager, logging};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

async fn run() -> Result<(), ()> {
    let config = DatabaseConfig::from_env()
        .log_err("Invalid database configuration")
        .map_err(drop)?;

    let pool = config
        .connect()
        .await
        .log_err("Failed to connect to database")
        .map_err(drop)?;

    schema::ensure_schema(&pool)
        .await
        .log_err("Failed to create schema")
        .map_err(drop)?;

    let username = std::env::var("DEMO_USERNAME").unwrap_or_else(|_| "demo".to_string());
    let accounts = AccountService::new(PgTransactionManager::postgres(pool));
    let ctx = Context::new();

    let registration = accounts
        .register_user(&ctx, &username)
        .await
        .log_err("Registration failed")
        .map_err(drop)?;

    let activities = accounts
        .activity_count(&ctx, registration.user_id)
        .await
        .log_err("Failed to count activities")
        .map_err(drop)?;

    println!(
        "Registered {} as user {} ({} activity recorded), api token {}",
        username, registration.user_id, activities, registration.api_token
    );
    Ok(())
}
