use std::io::Write;

use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_postgres::{types::ToSql, Client, NoTls};

use super::store::{CopyError, DbError, FactStore};
use crate::{config::DbConfig, error::AgeingError};

/// Run on every new session.  `COPY ... CSV` writes dates in the session
/// `DateStyle`, and the exported file is read back as ISO dates.
pub const SESSION_SETUP: &str = "SET client_min_messages TO WARNING; SET DateStyle TO ISO";

/// A single, exclusively owned connection to PostgreSQL.  The connection
/// driver runs on its own task until the client is dropped.
pub struct PgStore {
    client: Client,
    connection: JoinHandle<()>,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> Result<PgStore, AgeingError> {
        info!(
            "connecting to database {} on {}:{} as {}",
            config.database, config.host, config.port, config.user
        );
        let (client, connection) = match config.pg_config().connect(NoTls).await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to connect to database: {}", e);
                return Err(AgeingError::Connect(e));
            }
        };
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("database connection error: {}", e);
            }
        });
        if let Err(e) = client.batch_execute(SESSION_SETUP).await {
            error!("Failed to set up database session: {}", e);
            return Err(AgeingError::Connect(e));
        }
        info!("Database connection established successfully");
        Ok(PgStore { client, connection })
    }
}

#[async_trait]
impl FactStore for PgStore {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DbError> {
        Ok(self.client.batch_execute(sql).await?)
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, DbError> {
        Ok(self.client.execute(sql, params).await?)
    }

    async fn copy_out(
        &mut self,
        sql: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, CopyError> {
        let stream = self.client.copy_out(sql).await?;
        futures::pin_mut!(stream);
        let mut n: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk)?;
            n += chunk.len() as u64;
        }
        sink.flush()?;
        Ok(n)
    }

    async fn close(self) {
        drop(self.client);
        match self.connection.await {
            Ok(_) => info!("Database connection closed"),
            Err(e) => warn!("database connection task ended abnormally: {}", e),
        }
    }
}
