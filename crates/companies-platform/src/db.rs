use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    Connection, PgConnection, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

use crate::config::DbConfig;

const MAINTENANCE_DATABASE: &str = "postgres";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    employees_count INTEGER NOT NULL,
    is_registered BOOLEAN NOT NULL,
    company_type INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

fn server_options(config: &DbConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
}

/// Readiness probe: one round trip to the server's maintenance database, so
/// it succeeds before the service database has been created.
pub async fn ping(config: &DbConfig) -> Result<(), sqlx::Error> {
    let options = server_options(config).database(MAINTENANCE_DATABASE);
    let mut connection = PgConnection::connect_with(&options).await?;
    connection.ping().await?;
    connection.close().await
}

/// Creates the configured database when the server does not have it yet.
pub async fn ensure_database(config: &DbConfig) -> Result<()> {
    let options = server_options(config).database(MAINTENANCE_DATABASE);
    let mut connection = PgConnection::connect_with(&options)
        .await
        .context("failed to connect to the maintenance database")?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&config.name)
            .fetch_one(&mut connection)
            .await
            .context("failed to look up database")?;

    if !exists {
        // identifiers cannot be bound as parameters
        let statement = format!("CREATE DATABASE {}", quote_ident(&config.name));
        sqlx::query(&statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to create database {}", config.name))?;
        info!("created database {}", config.name);
    }

    connection.close().await?;
    Ok(())
}

pub async fn connect_database(config: &DbConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect_with(server_options(config).database(&config.name))
        .await?;

    Ok(pool)
}

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .context("failed to create companies table")?;
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
