use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashMap;

use crate::time::now_ms;
use tracing::{error, info};

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    match trimmed.char_indices().nth(160) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

static MIGRATIONS: &[(&str, &str)] = &[
    (
        "202601121015_catalog.sql",
        include_str!("../migrations/202601121015_catalog.sql"),
    ),
    (
        "202601121540_override_unique.sql",
        include_str!("../migrations/202601121540_override_unique.sql"),
    ),
    (
        "202601200930_week_plans.sql",
        include_str!("../migrations/202601200930_week_plans.sql"),
    ),
    (
        "202602021100_shopping_lists.sql",
        include_str!("../migrations/202602021100_shopping_lists.sql"),
    ),
];

fn checksum_of(raw_sql: &str) -> String {
    let cleaned = raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;

    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied: HashMap<String, String> = HashMap::new();
    for row in rows {
        let version: String = row.try_get("version")?;
        let checksum: String = row.try_get("checksum")?;
        applied.insert(version, checksum);
    }

    for (filename, raw_sql) in MIGRATIONS {
        let checksum = checksum_of(raw_sql);
        if let Some(existing) = applied.get(*filename) {
            if existing != &checksum {
                error!(
                    target: "larder",
                    event = "migration_checksum_mismatch",
                    version = filename,
                );
                anyhow::bail!("checksum mismatch for applied migration {filename}");
            }
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in raw_sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                error!(
                    target: "larder",
                    event = "migration_failed",
                    version = filename,
                    sql = %preview(statement),
                    error = %e,
                );
                e
            })?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(target: "larder", event = "migration_applied", version = filename);
    }

    Ok(())
}
