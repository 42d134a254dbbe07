use std::path::PathBuf;
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::shared::config::DatabaseConfig;

/// Open the connection pool described by `config`.
///
/// For SQLite file databases the parent directory is created first.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    if let Some(path) = sqlite_file_path(&config.url) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    if is_postgres_url(&config.url) {
        // unqualified DDL and the catalog reader both resolve through this schema
        options.set_schema_search_path(config.schema.clone());
    }

    let conn = Database::connect(options).await?;
    tracing::info!(
        backend = ?conn.get_database_backend(),
        schema = %config.schema,
        max_connections = config.max_connections,
        "Database connection established"
    );
    Ok(conn)
}

/// File behind a `sqlite:` URL; `None` for in-memory databases and other backends
fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}
