use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use sqlx::{Pool, Sqlite};

/// Applies every `NNN_name.sql` file of `dir` that is not yet recorded in
/// `schema_migrations`, in ascending number order. Each file runs in its own
/// transaction together with its bookkeeping row.
pub async fn migrate(p: &Pool<Sqlite>, dir: impl AsRef<Path>) -> anyhow::Result<usize> {
    let dir = dir.as_ref();
    let migration_files = migration_files(dir)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(p)
    .await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(p)
        .await?;

    log::debug!("starting migration from {}", dir.display());
    let mut count = 0;
    for (number, path) in &migration_files {
        if applied.contains(&(*number as i64)) {
            continue;
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read migration {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        log::info!("migrating {}", path.display());
        let mut tx = p.begin().await?;
        sqlx::raw_sql(&content)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {} failed", name))?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(*number as i64)
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        count += 1;
    }

    log::debug!("migration end, {} applied", count);
    Ok(count)
}

fn migration_files(dir: &Path) -> anyhow::Result<Vec<(usize, PathBuf)>> {
    let mut migration_files: Vec<(usize, PathBuf)> = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("cannot open {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;

        if !entry.metadata()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }

        let file_name = entry.file_name();
        let file_name = file_name
            .to_str()
            .ok_or_else(|| anyhow!("migration name is not utf-8: {}", path.display()))?;
        let migration_number: usize = file_name
            .split('_')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("migration without number prefix: {}", file_name))?;

        migration_files.push((migration_number, path))
    }

    migration_files.sort_by_key(|v| v.0);
    Ok(migration_files)
}
