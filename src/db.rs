use anyhow::Context;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

use crate::auth::password::hash_password;
use crate::model::role::Role;

/// Connects and brings the schema up to date.
pub async fn init_db(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    Ok(pool)
}

/// Creates an HR login not linked to any employee, unless the username is
/// already taken.
pub async fn ensure_hr_account(pool: &MySqlPool, username: &str, password: &str) -> anyhow::Result<()> {
    let hashed = hash_password(password)?;

    let result = sqlx::query(
        r#"
        INSERT IGNORE INTO users (username, password, role_id, employee_id, must_change_password)
        VALUES (?, ?, ?, NULL, TRUE)
        "#,
    )
    .bind(username.trim())
    .bind(hashed)
    .bind(Role::Hr.id())
    .execute(pool)
    .await
    .context("Failed to create bootstrap HR account")?;

    if result.rows_affected() > 0 {
        info!(username = username.trim(), "Bootstrap HR account created");
    }
    Ok(())
}
