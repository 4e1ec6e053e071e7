//! Account service
//!
//! Service functions open transactions with `run_in_transaction`; they call each other freely
//! and every nested call joins the transaction of the outermost one. Reads run inside the
//! ambient transaction when there is one and against the pool otherwise.

use chrono::Utc;

use crate::context::Context;
use crate::domain::{activities, users};
use crate::postgres::PgTransactionManager;
use crate::services::error::ServiceError;
use crate::services::tokens::generate_api_token;

pub const SIGNUP_EVENT: &str = "Signup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user_id: i64,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    tx: PgTransactionManager,
}

impl AccountService {
    pub fn new(tx: PgTransactionManager) -> Self {
        Self { tx }
    }

    pub fn transactions(&self) -> &PgTransactionManager {
        &self.tx
    }

    /// Create a user, give it an API token and record the signup, all in one transaction.
    ///
    /// When `ctx` already carries a transaction the registration becomes part of it.
    pub async fn register_user(
        &self,
        ctx: &Context,
        username: &str,
    ) -> Result<Registration, ServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::InvalidUsername);
        }
        let requested = username.to_owned();
        let service = self.clone();
        let joins_ambient = self.tx.in_transaction(ctx);

        let registration = self
            .tx
            .run_in_transaction(ctx, move |ctx| async move {
                let user_id = service.create_user(&ctx, &requested).await?;
                let api_token = service.rotate_api_token(&ctx, user_id).await?;
                service
                    .record_activity(&ctx, user_id, SIGNUP_EVENT, None)
                    .await?;
                Ok::<_, ServiceError>(Registration { user_id, api_token })
            })
            .await?;

        if joins_ambient {
            log::debug!(
                "staged user {} as {} in the enclosing transaction",
                username,
                registration.user_id
            );
        } else {
            log::info!("registered user {} as {}", username, registration.user_id);
        }
        Ok(registration)
    }

    /// Replace the user's API token and return the new one.
    pub async fn rotate_api_token(
        &self,
        ctx: &Context,
        user_id: i64,
    ) -> Result<String, ServiceError> {
        let service = self.clone();

        self.tx
            .run_in_transaction(ctx, move |ctx| async move {
                let tx = service
                    .tx
                    .current_transaction(&ctx)
                    .ok_or(ServiceError::NoTransaction)?;
                let mut conn = tx.connection().await?;

                let token = generate_api_token();
                if !users::set_user_api_token(&mut **conn, user_id, &token).await? {
                    return Err(ServiceError::UserNotFound(user_id));
                }
                Ok::<_, ServiceError>(token)
            })
            .await
    }

    /// Append an activity for an existing user.
    pub async fn record_activity(
        &self,
        ctx: &Context,
        user_id: i64,
        event_type: &str,
        application: Option<&str>,
    ) -> Result<(), ServiceError> {
        let event_type = event_type.to_owned();
        let application = application.map(str::to_owned);
        let service = self.clone();

        self.tx
            .run_in_transaction(ctx, move |ctx| async move {
                let tx = service
                    .tx
                    .current_transaction(&ctx)
                    .ok_or(ServiceError::NoTransaction)?;
                let mut conn = tx.connection().await?;

                if users::get_user_by_id(&mut **conn, user_id).await?.is_none() {
                    return Err(ServiceError::UserNotFound(user_id));
                }
                activities::insert_activity(
                    &mut **conn,
                    user_id,
                    Utc::now(),
                    &event_type,
                    application.as_deref(),
                )
                .await?;
                Ok::<_, ServiceError>(())
            })
            .await
    }

    pub async fn get_user(
        &self,
        ctx: &Context,
        user_id: i64,
    ) -> Result<Option<users::User>, ServiceError> {
        match self.tx.current_transaction(ctx) {
            Some(tx) => {
                let mut conn = tx.connection().await?;
                Ok(users::get_user_by_id(&mut **conn, user_id).await?)
            }
            None => Ok(users::get_user_by_id(self.tx.pool(), user_id).await?),
        }
    }

    pub async fn activity_count(&self, ctx: &Context, user_id: i64) -> Result<i64, ServiceError> {
        match self.tx.current_transaction(ctx) {
            Some(tx) => {
                let mut conn = tx.connection().await?;
                Ok(activities::count_activities_for_user(&mut **conn, user_id).await?)
            }
            None => Ok(activities::count_activities_for_user(self.tx.pool(), user_id).await?),
        }
    }

    async fn create_user(&self, ctx: &Context, username: &str) -> Result<i64, ServiceError> {
        let tx = self
            .tx
            .current_transaction(ctx)
            .ok_or(ServiceError::NoTransaction)?;
        let mut conn = tx.connection().await?;

        match users::insert_user(&mut **conn, username).await {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ServiceError::UsernameTaken(username.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
