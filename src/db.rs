use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use tokio::fs;

/// Open a SeaORM connection with pool settings suited to a small API
/// node. sqlx's own statement logging is off; the `debug-print` feature
/// already traces queries at the `debug` level.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Apply every `*.sql` file under `migrations/`, in filename order. The
/// files are written to be re-runnable, so this executes at every boot.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    let mut applied = 0usize;
    for file in files {
        tracing::debug!(file = %file.display(), "applying migration");
        let sql = portable_ddl(backend, &fs::read_to_string(&file).await?);
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await?;
        }
        applied += 1;
    }
    tracing::info!(files = applied, "migrations applied");

    Ok(())
}

/// Postgres only decodes `Decimal` from true `NUMERIC` columns, while
/// SQLite's NUMERIC affinity keeps INTEGER storage for whole-number amounts,
/// which the Decimal read path there cannot handle. Money columns therefore
/// stay `NUMERIC(12, 2)` in the files and become `REAL` on SQLite.
fn portable_ddl(backend: DbBackend, sql: &str) -> String {
    match backend {
        DbBackend::Sqlite => sql.replace("NUMERIC(12, 2)", "REAL"),
        _ => sql.to_string(),
    }
}
