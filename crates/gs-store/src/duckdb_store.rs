use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use gs_types::{Configuration, EvaluationResult, GsError, GsResult, StoreError};
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::{check_record, ResultStore};

/// Result store backed by an embedded DuckDB database.
///
/// The connection sits behind a mutex so writes are serialized; every
/// `record` runs in its own transaction.
pub struct DuckDbResultStore {
    connection: Mutex<Connection>,
    table: String,
}

impl fmt::Debug for DuckDbResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDbResultStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl DuckDbResultStore {
    /// Open the database described by `config`, creating parent directories
    /// for file-backed stores. The schema is not touched until
    /// [`ResultStore::ensure_schema`].
    pub fn open(config: &StoreConfig) -> GsResult<Self> {
        config.validate()?;

        let connection = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                open_file(path)?
            }
            None => Connection::open_in_memory().map_err(connection_error)?,
        };

        tracing::debug!(
            "Opened result store {} (table {})",
            config
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            config.table
        );

        Ok(Self {
            connection: Mutex::new(connection),
            table: config.table.clone(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Close the connection, surfacing any error DuckDB reports on shutdown.
    pub fn close(self) -> GsResult<()> {
        self.connection
            .into_inner()
            .close()
            .map_err(|(_, e)| connection_error(e))
    }

    fn select_columns(&self) -> String {
        format!("SELECT id, params, mean_score, recorded_at FROM {}", self.table)
    }
}

fn open_file(path: &Path) -> GsResult<Connection> {
    Connection::open(path).map_err(connection_error)
}

fn connection_error(e: duckdb::Error) -> GsError {
    StoreError::Connection {
        message: e.to_string(),
    }
    .into()
}

fn query_failed(query: &str, e: duckdb::Error) -> GsError {
    StoreError::QueryFailed {
        query: query.to_string(),
        error: e.to_string(),
    }
    .into()
}

fn is_unique_violation(e: &duckdb::Error) -> bool {
    let message = e.to_string();
    message.contains("Duplicate key") || message.contains("unique constraint")
}

/// Raw row as read from the table, before the params column is parsed.
struct StoredRow {
    id: i64,
    params: String,
    mean_score: f64,
    recorded_at: String,
}

impl StoredRow {
    fn into_result(self) -> GsResult<EvaluationResult> {
        let configuration = Configuration::from_canonical_key(&self.params).map_err(|e| {
            StoreError::Corruption {
                message: format!("row {} has unreadable params {:?}: {e}", self.id, self.params),
            }
        })?;
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|e| StoreError::Corruption {
                message: format!("row {} has bad timestamp {:?}: {e}", self.id, self.recorded_at),
            })?
            .with_timezone(&Utc);

        Ok(EvaluationResult {
            id: self.id,
            configuration,
            score: self.mean_score,
            recorded_at,
        })
    }
}

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        params: row.get(1)?,
        mean_score: row.get(2)?,
        recorded_at: row.get(3)?,
    })
}

impl ResultStore for DuckDbResultStore {
    fn ensure_schema(&self) -> GsResult<()> {
        let sql = format!(
            "CREATE SEQUENCE IF NOT EXISTS {table}_id_seq START 1;

            CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT PRIMARY KEY DEFAULT nextval('{table}_id_seq'),
                params TEXT NOT NULL UNIQUE,
                mean_score DOUBLE NOT NULL,
                recorded_at TEXT NOT NULL
            );",
            table = self.table
        );

        self.connection
            .lock()
            .execute_batch(&sql)
            .map_err(|e| StoreError::Schema {
                message: e.to_string(),
            })?;

        tracing::debug!("Schema ready for table {}", self.table);
        Ok(())
    }

    fn load_evaluated_keys(&self) -> GsResult<HashSet<String>> {
        let query = format!("SELECT params FROM {}", self.table);
        let connection = self.connection.lock();

        let mut stmt = connection
            .prepare(&query)
            .map_err(|e| query_failed(&query, e))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| query_failed(&query, e))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| query_failed(&query, e))?;

        Ok(keys)
    }

    fn record(&self, configuration: &Configuration, score: f64) -> GsResult<EvaluationResult> {
        check_record(configuration, score)?;
        let key = configuration.canonical_key();
        let recorded_at = Utc::now();

        let mut connection = self.connection.lock();
        let tx = connection.transaction().map_err(connection_error)?;

        let exists_query = format!("SELECT COUNT(*) FROM {} WHERE params = ?", self.table);
        let existing: i64 = tx
            .query_row(&exists_query, params![key], |row| row.get(0))
            .map_err(|e| query_failed(&exists_query, e))?;
        if existing > 0 {
            return Err(StoreError::DuplicateKey { key }.into());
        }

        let insert = format!(
            "INSERT INTO {} (params, mean_score, recorded_at) VALUES (?, ?, ?) RETURNING id",
            self.table
        );
        let id: i64 = tx
            .query_row(
                &insert,
                params![key, score, recorded_at.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(|e| {
                // A concurrent writer slipped in between the check and the insert.
                if is_unique_violation(&e) {
                    GsError::from(StoreError::DuplicateKey { key: key.clone() })
                } else {
                    query_failed(&insert, e)
                }
            })?;

        tx.commit().map_err(|e| query_failed("COMMIT", e))?;

        Ok(EvaluationResult {
            id,
            configuration: configuration.clone(),
            score,
            recorded_at,
        })
    }

    fn best_result(&self) -> GsResult<EvaluationResult> {
        let query = format!(
            "{} ORDER BY mean_score DESC, id ASC LIMIT 1",
            self.select_columns()
        );
        let connection = self.connection.lock();

        let mut stmt = connection
            .prepare(&query)
            .map_err(|e| query_failed(&query, e))?;
        let mut rows = stmt
            .query_map([], read_row)
            .map_err(|e| query_failed(&query, e))?;

        match rows.next() {
            Some(row) => row.map_err(|e| query_failed(&query, e))?.into_result(),
            None => Err(StoreError::EmptyStore.into()),
        }
    }

    fn count(&self) -> GsResult<usize> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = self
            .connection
            .lock()
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| query_failed(&query, e))?;
        Ok(count.max(0) as usize)
    }

    fn results(&self) -> GsResult<Vec<EvaluationResult>> {
        let query = format!("{} ORDER BY id ASC", self.select_columns());
        let connection = self.connection.lock();

        let mut stmt = connection
            .prepare(&query)
            .map_err(|e| query_failed(&query, e))?;
        let rows = stmt
            .query_map([], read_row)
            .map_err(|e| query_failed(&query, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| query_failed(&query, e))?;

        rows.into_iter().map(StoredRow::into_result).collect()
    }
}
