//! User domain - DB queries for users

use sqlx::{Executor, Postgres};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub api_token: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct InsertedUser {
    id: i64,
}

/// Insert a user and return its id
pub async fn insert_user<'e, E>(executor: E, username: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: InsertedUser = sqlx::query_as(
        r#"
        INSERT INTO users (username)
        VALUES ($1)
        RETURNING id
        "#,
    )
    .bind(username)
    .fetch_one(executor)
    .await?;

    Ok(row.id)
}

pub async fn get_user_by_id<'e, E>(executor: E, user_id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, username, api_token FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_user_by_username<'e, E>(
    executor: E,
    username: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, username, api_token FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(executor)
        .await
}

/// Set the API token for a user. Returns false if the user does not exist.
pub async fn set_user_api_token<'e, E>(
    executor: E,
    user_id: i64,
    token: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("UPDATE users SET api_token = $1 WHERE id = $2")
        .bind(token)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}
