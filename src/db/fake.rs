//! A [`FactStore`] that keeps every statement in memory, for tests.

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio_postgres::types::ToSql;

use super::store::{CopyError, DbError, FactStore};

/// Records every statement, fails the ones containing `fail_on`.
#[derive(Clone, Default)]
pub struct FakeStore {
    pub log: Arc<Mutex<Vec<String>>>,
    pub params: Arc<Mutex<Vec<Vec<String>>>>,
    pub closed: Arc<Mutex<u32>>,
    pub fail_on: Option<String>,
    pub copy_data: String,
    pub rows_affected: u64,
}

impl FakeStore {
    fn record(&self, sql: &str) -> Result<(), DbError> {
        self.log.lock().unwrap().push(sql.to_string());
        match &self.fail_on {
            Some(s) if sql.contains(s.as_str()) => Err(format!("boom: {}", s).into()),
            _ => Ok(()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl FactStore for FakeStore {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.record(sql)
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, DbError> {
        self.params
            .lock()
            .unwrap()
            .push(params.iter().map(|p| format!("{:?}", p)).collect());
        self.record(sql)?;
        Ok(self.rows_affected)
    }

    async fn copy_out(
        &mut self,
        sql: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, CopyError> {
        self.record(sql).map_err(CopyError::Db)?;
        sink.write_all(self.copy_data.as_bytes())?;
        sink.flush()?;
        Ok(self.copy_data.len() as u64)
    }

    async fn close(self) {
        *self.closed.lock().unwrap() += 1;
    }
}
