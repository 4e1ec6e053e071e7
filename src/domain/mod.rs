//! Repository layer: plain query functions
//!
//! Every function is generic over `sqlx::Executor`, so it runs equally against `&PgPool` and
//! against the connection of an ambient transaction (`&mut **tx.connection().await?`). None of
//! them decide transaction boundaries.

pub mod activities;
pub mod schema;
pub mod users;
