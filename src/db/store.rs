use std::{fmt, io::Write};

use async_trait::async_trait;
use tokio_postgres::types::ToSql;

pub type DbError = Box<dyn std::error::Error + Send + Sync>;

/// The handful of database primitives the ageing job needs.  Implemented by
/// [`crate::db::postgres::PgStore`] for a live server.
///
/// Transactions are explicit: `begin` opens one, `commit`/`rollback` close it.
#[async_trait]
pub trait FactStore: Send + Sized {
    /// Run one or more statements without parameters.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Run a single parameterized statement, return the number of rows
    /// affected.
    async fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)])
        -> Result<u64, DbError>;

    /// Run a `COPY ... TO STDOUT` statement and write everything the server
    /// sends to `sink`.  Return the number of bytes written.
    async fn copy_out(&mut self, sql: &str, sink: &mut (dyn Write + Send))
        -> Result<u64, CopyError>;

    async fn begin(&mut self) -> Result<(), DbError> {
        self.batch_execute("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.batch_execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.batch_execute("ROLLBACK").await
    }

    /// Close the connection.
    async fn close(self);
}

/// A `copy_out` can fail on either side of the stream.
#[derive(Debug)]
pub enum CopyError {
    Db(DbError),
    Io(std::io::Error),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::Db(e) => write!(f, "{}", e),
            CopyError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CopyError {}

impl From<tokio_postgres::Error> for CopyError {
    fn from(e: tokio_postgres::Error) -> Self {
        CopyError::Db(Box::new(e))
    }
}

impl From<std::io::Error> for CopyError {
    fn from(e: std::io::Error) -> Self {
        CopyError::Io(e)
    }
}
