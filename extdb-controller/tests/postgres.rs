//! Tests against a real server. Run with
//! `DB_HOST=... DB_PASS=... cargo test -- --ignored`.

use std::env;

use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};

use extdb_controller::driver::{
    DriverError, PgConnector, PgPoolConnector, ResourceDriver, SqlDriver,
};

fn options_from_env() -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()))
        .port(
            env::var("DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
        )
        .username(&env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()))
        .database(&env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string()));
    match env::var("DB_PASS") {
        Ok(password) => options.password(&password),
        Err(_) => options,
    }
}

async fn role_exists(name: &str) -> bool {
    let mut conn = PgConnection::connect_with(&options_from_env()).await.unwrap();
    let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM pg_roles WHERE rolname = $1")
        .bind(name)
        .fetch_optional(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    found.is_some()
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn test_role_lifecycle_against_server() {
    let driver = SqlDriver::new(PgConnector::new(options_from_env()));
    let role = format!("extdb_it_{}", uuid::Uuid::new_v4().simple());

    driver.ensure_role_exists(&role).await.unwrap();
    driver.ensure_role_exists(&role).await.unwrap();
    assert!(role_exists(&role).await);

    driver.ensure_role_absent(&role).await.unwrap();
    driver.ensure_role_absent(&role).await.unwrap();
    assert!(!role_exists(&role).await);
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn test_database_lifecycle_through_pool() {
    let connector = PgPoolConnector::new(options_from_env(), 2);
    let driver = SqlDriver::new(connector);
    let database = format!("extdb_it_{}", uuid::Uuid::new_v4().simple());

    driver.ensure_database_exists(&database).await.unwrap();
    driver.ensure_database_exists(&database).await.unwrap();
    driver.ensure_database_absent(&database).await.unwrap();
    driver.ensure_database_absent(&database).await.unwrap();

    driver.connector().close().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn test_quoted_name_round_trips() {
    let driver = SqlDriver::new(PgConnector::new(options_from_env()));
    let role = format!("it \"{}\"", uuid::Uuid::new_v4().simple());

    driver.ensure_role_exists(&role).await.unwrap();
    assert!(role_exists(&role).await);
    driver.ensure_role_absent(&role).await.unwrap();
    assert!(!role_exists(&role).await);
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    let options = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(1)
        .username("postgres");
    let driver = SqlDriver::new(PgConnector::new(options));

    let err = driver.ensure_role_exists("alice_role").await.unwrap_err();
    assert!(matches!(err, DriverError::Connection(_)), "got {err:?}");
    assert!(err.is_retryable());
}
