//! Activities domain - DB queries for activity tracking

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

#[derive(Debug, sqlx::FromRow)]
struct CountResult {
    count: i64,
}

/// Insert an activity record
pub async fn insert_activity<'e, E>(
    executor: E,
    user_id: i64,
    timestamp: DateTime<Utc>,
    event_type: &str,
    application: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO activities (user_id, timestamp, event_type, application)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(timestamp)
    .bind(event_type)
    .bind(application)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn count_activities_for_user<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result: CountResult =
        sqlx::query_as("SELECT COUNT(*) AS count FROM activities WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(executor)
            .await?;

    Ok(result.count)
}
