use std::str::FromStr;

use anyhow::Context;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};

use crate::include_res;

/// Opens the message database, creating the file and schema when missing.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
        .create_if_missing(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("couldn't open {database_url}"))?;

    sqlx::raw_sql(include_res!(str, "/schema.sql"))
        .execute(&db_pool)
        .await
        .context("couldn't apply schema")?;

    Ok(db_pool)
}
