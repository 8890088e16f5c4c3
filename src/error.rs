use std::path::PathBuf;

use jiff::civil::Date;
use thiserror::Error;

use crate::db::store::DbError;

#[derive(Error, Debug)]
pub enum AgeingError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("missing migration files: {}", display_paths(.0))]
    MissingMigrations(Vec<PathBuf>),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed: {source}")]
    Sql {
        step: &'static str,
        #[source]
        source: DbError,
    },

    #[error("failed reading exported csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid export for {as_at_date}, document {document_id}: {reason}")]
    InvalidExport {
        as_at_date: Date,
        document_id: String,
        reason: String,
    },

    #[error("not connected to the database")]
    NotConnected,
}

impl AgeingError {
    pub fn sql(step: &'static str, source: DbError) -> Self {
        AgeingError::Sql { step, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AgeingError::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
