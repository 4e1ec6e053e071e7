use sqlx::{Executor, Postgres};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    api_token TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS activities (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    timestamp TIMESTAMPTZ NOT NULL,
    event_type TEXT NOT NULL,
    application TEXT
);
"#;

/// Create the tables used by the account service if they are missing
pub async fn ensure_schema<'e, E>(executor: E) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::raw_sql(SCHEMA).execute(executor).await?;
    Ok(())
}
