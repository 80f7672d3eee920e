use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use shared::config::server::DatabaseConfig;

/// Script folders under the bootstrap root, applied in this order.
const STAGES: &[&str] = &["schema", "indexes"];

/// Tables the stores read and write; readiness fails until all exist.
const REQUIRED_TABLES: &[&str] = &["beacon_profiles", "beacon_messages", "beacon_notifications"];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database bootstrap directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("database bootstrap stage '{stage}' missing at {path}")]
    MissingStage { stage: &'static str, path: PathBuf },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error executing {path}: {source}")]
    Sql {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies every stage's scripts in file-name order. Scripts are written to
/// be re-runnable.
///
/// # Errors
/// Returns [`BootstrapError`] when a stage folder is missing or a script
/// cannot be read or executed.
pub async fn run(pool: &PgPool, config: &DatabaseConfig) -> Result<(), BootstrapError> {
    for (stage, files) in plan(&config.bootstrap_path)? {
        if files.is_empty() {
            debug!(stage, "no bootstrap scripts found for stage");
            continue;
        }

        info!(stage, count = files.len(), "applying bootstrap scripts");
        for path in files {
            apply_script(pool, &path).await?;
        }
    }

    Ok(())
}

/// Resolves the scripts each stage would run without touching the database.
fn plan(root: &Path) -> Result<Vec<(&'static str, Vec<PathBuf>)>, BootstrapError> {
    if !root.exists() {
        return Err(BootstrapError::MissingRoot(root.to_path_buf()));
    }

    STAGES
        .iter()
        .map(|&stage| {
            let stage_path = root.join(stage);
            if !stage_path.exists() {
                return Err(BootstrapError::MissingStage {
                    stage,
                    path: stage_path,
                });
            }
            Ok((stage, collect_sql_files(&stage_path)?))
        })
        .collect()
}

/// Startup liveness check.
///
/// # Errors
/// Propagates the connection error.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe: every store table must be present.
///
/// # Errors
/// Returns [`sqlx::Error::Protocol`] naming the first missing table.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    for table in REQUIRED_TABLES {
        let present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("public.{table}"))
            .fetch_one(pool)
            .await?;
        if !present {
            return Err(sqlx::Error::Protocol(format!("table {table} is missing")));
        }
    }
    Ok(())
}

fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>, BootstrapError> {
    let read_dir = fs::read_dir(dir).map_err(|source| BootstrapError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let path = entry
            .map_err(|source| BootstrapError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
        {
            entries.push(path);
        }
    }

    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

async fn apply_script(pool: &PgPool, path: &Path) -> Result<(), BootstrapError> {
    let sql_error = |source| BootstrapError::Sql {
        path: path.to_path_buf(),
        source,
    };

    let sql = fs::read_to_string(path).map_err(|source| BootstrapError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        warn!(path = %path.display(), "skipping empty bootstrap script");
        return Ok(());
    }

    let mut transaction = pool.begin().await.map_err(sql_error)?;
    info!(script = %path.display(), "executing bootstrap script");
    sqlx::raw_sql(trimmed)
        .execute(&mut *transaction)
        .await
        .map_err(sql_error)?;
    transaction.commit().await.map_err(sql_error)
}
