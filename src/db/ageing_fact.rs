use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use jiff::civil::Date;
use log::{debug, error, info, warn};
use tokio_postgres::types::ToSql;

use super::{
    migrations::load_migrations,
    postgres::PgStore,
    store::{CopyError, DbError, FactStore},
};
use crate::{config::DbConfig, error::AgeingError};

pub const TABLE: &str = "ageing_fact_table";

/// Columns of the exported csv file, in order.
pub const COLUMNS: [&str; 14] = [
    "centre_id",
    "class_id",
    "document_id",
    "document_date",
    "student_id",
    "day_30",
    "day_60",
    "day_90",
    "day_120",
    "day_150",
    "day_180",
    "day_180_and_above",
    "document_type",
    "as_at_date",
];

pub const DELETE_SQL: &str = "DELETE FROM ageing_fact_table WHERE as_at_date = $1";

/// The generation query references the snapshot date this many times, as
/// `$1` to `$6`.
pub const GENERATE_PARAMS: usize = 6;

pub const DEFAULT_GENERATE_SQL: &str = "sql/generate_ageing_fact.sql";

/// Rows touched by a rebuild of one snapshot date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebuild {
    pub deleted: u64,
    pub inserted: u64,
}

/// The ageing fact table, reached through one exclusively owned connection.
/// All the operations for a run act on a single snapshot date passed in by
/// the caller.
pub struct AgeingFactArchive<S: FactStore> {
    store: Option<S>,
    pub generate_sql_path: PathBuf,
}

impl AgeingFactArchive<PgStore> {
    pub async fn connect(
        config: &DbConfig,
        generate_sql_path: impl Into<PathBuf>,
    ) -> Result<Self, AgeingError> {
        let store = PgStore::connect(config).await?;
        Ok(AgeingFactArchive::new(store, generate_sql_path))
    }
}

impl<S: FactStore> AgeingFactArchive<S> {
    pub fn new(store: S, generate_sql_path: impl Into<PathBuf>) -> Self {
        AgeingFactArchive {
            store: Some(store),
            generate_sql_path: generate_sql_path.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Default name of the csv file for the day.  Does not check if the file
    /// exists.
    pub fn filename(as_at_date: Date) -> String {
        format!("ageing_fact_table_{}.csv", as_at_date.strftime("%Y-%m-%d"))
    }

    /// The `COPY` statement streaming one day of the table as csv.
    pub fn export_sql(as_at_date: Date) -> String {
        let order = ["centre_id", "class_id", "document_id", "document_type"]
            .map(|c| format!("{} COLLATE \"C\"", c))
            .join(", ");
        format!(
            r#"COPY (
    SELECT {}
    FROM {}
    WHERE as_at_date = '{}'
    ORDER BY {}
) TO STDOUT WITH CSV HEADER"#,
            COLUMNS.join(", "),
            TABLE,
            as_at_date.strftime("%Y-%m-%d"),
            order
        )
    }

    fn store(&mut self) -> Result<&mut S, AgeingError> {
        self.store.as_mut().ok_or(AgeingError::NotConnected)
    }

    /// Commit if `res` is ok, roll back otherwise.  A failed rollback is only
    /// logged, the original error is returned.
    async fn settle<T>(
        &mut self,
        step: &'static str,
        res: Result<T, DbError>,
    ) -> Result<T, AgeingError> {
        let store = self.store()?;
        match res {
            Ok(v) => match store.commit().await {
                Ok(_) => Ok(v),
                Err(e) => {
                    error!("Failed to commit {}: {}", step, e);
                    Err(AgeingError::sql(step, e))
                }
            },
            Err(e) => {
                error!("Failed to {}: {}", step, e);
                if let Err(rb) = store.rollback().await {
                    warn!("rollback after failed {} also failed: {}", step, rb);
                }
                Err(AgeingError::sql(step, e))
            }
        }
    }

    async fn begin(&mut self, step: &'static str) -> Result<(), AgeingError> {
        self.store()?.begin().await.map_err(|e| {
            error!("Failed to open a transaction for {}: {}", step, e);
            AgeingError::sql(step, e)
        })
    }

    /// Run the migration files in the order given, each one in its own
    /// transaction.  Every file must exist before anything is executed.
    /// Stops at the first failing migration.
    pub async fn run_migrations<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<usize, AgeingError> {
        let migrations = load_migrations(paths)?;
        self.store()?;
        for migration in &migrations {
            info!("running migration {} ...", migration.name());
            self.begin("run migration").await?;
            let res = self.store()?.batch_execute(&migration.sql).await;
            self.settle("run migration", res).await.map_err(|e| {
                error!("migration {} failed, stopping", migration.path.display());
                e
            })?;
            info!("applied migration {}", migration.name());
        }
        Ok(migrations.len())
    }

    async fn delete_rows(&mut self, as_at_date: Date) -> Result<u64, DbError> {
        let store = self.store.as_mut().ok_or(AgeingError::NotConnected)?;
        debug!("{} [$1 = {}]", DELETE_SQL, as_at_date);
        store.execute(DELETE_SQL, &[&as_at_date]).await
    }

    async fn insert_rows(&mut self, sql: &str, as_at_date: Date) -> Result<u64, DbError> {
        let store = self.store.as_mut().ok_or(AgeingError::NotConnected)?;
        let params: [&(dyn ToSql + Sync); GENERATE_PARAMS] = [&as_at_date; GENERATE_PARAMS];
        debug!("{}", sql);
        store.execute(sql, &params).await
    }

    fn read_generate_sql(&self) -> Result<String, AgeingError> {
        fs::read_to_string(&self.generate_sql_path).map_err(|e| {
            error!(
                "Failed to read {}: {}",
                self.generate_sql_path.display(),
                e
            );
            AgeingError::io(&self.generate_sql_path, e)
        })
    }

    /// Delete all the rows for this date, in a transaction of its own.
    /// Return the number of rows deleted.
    pub async fn clear_existing(&mut self, as_at_date: Date) -> Result<u64, AgeingError> {
        self.begin("clear existing ageing data").await?;
        let res = self.delete_rows(as_at_date).await;
        let n = self.settle("clear existing ageing data", res).await?;
        info!("Cleared {} existing ageing rows for date: {}", n, as_at_date);
        Ok(n)
    }

    /// Run the generation query for this date, in a transaction of its own.
    /// Return the number of rows inserted.
    pub async fn generate(&mut self, as_at_date: Date) -> Result<u64, AgeingError> {
        let sql = self.read_generate_sql()?;
        self.begin("generate ageing fact").await?;
        let res = self.insert_rows(&sql, as_at_date).await;
        let n = self.settle("generate ageing fact", res).await?;
        info!(
            "Ageing fact table generated successfully for date: {}, {} rows",
            as_at_date, n
        );
        Ok(n)
    }

    /// Replace the rows for this date: delete and generate in one
    /// transaction, so a failure keeps the previous rows in place.
    pub async fn rebuild(&mut self, as_at_date: Date) -> Result<Rebuild, AgeingError> {
        let sql = self.read_generate_sql()?;
        self.begin("rebuild ageing fact").await?;
        let res = match self.delete_rows(as_at_date).await {
            Ok(deleted) => self
                .insert_rows(&sql, as_at_date)
                .await
                .map(|inserted| Rebuild { deleted, inserted }),
            Err(e) => Err(e),
        };
        let rebuild = self.settle("rebuild ageing fact", res).await?;
        info!(
            "Rebuilt ageing fact table for date: {}, {} rows deleted, {} rows inserted",
            as_at_date, rebuild.deleted, rebuild.inserted
        );
        Ok(rebuild)
    }

    /// Stream the rows for this date to a csv file with a header.  If `path`
    /// is `None` the file is [`Self::filename`] in the working directory.
    /// A partially written file is left in place on failure.
    pub async fn export_csv(
        &mut self,
        as_at_date: Date,
        path: Option<&Path>,
    ) -> Result<PathBuf, AgeingError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(Self::filename(as_at_date)),
        };
        let sql = Self::export_sql(as_at_date);
        debug!("{}", sql);
        let store = self.store()?;

        let file = File::create(&path).map_err(|e| {
            error!("Failed to export ageing results: {}", e);
            AgeingError::io(&path, e)
        })?;
        let mut writer = BufWriter::new(file);
        match store.copy_out(&sql, &mut writer).await {
            Ok(n) => {
                info!(
                    "Exported ageing fact table to: {} ({} bytes)",
                    path.display(),
                    n
                );
                Ok(path)
            }
            Err(e) => {
                error!("Failed to export ageing results: {}", e);
                match e {
                    CopyError::Io(e) => Err(AgeingError::io(&path, e)),
                    CopyError::Db(e) => Err(AgeingError::sql("export ageing fact", e)),
                }
            }
        }
    }

    /// Close the connection.  Calling it again, or on an archive that never
    /// connected, does nothing.
    pub async fn disconnect(&mut self) {
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}
