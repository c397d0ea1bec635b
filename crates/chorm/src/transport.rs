//! Wire-level seam between the client adapter and a ClickHouse connection.

use crate::config::ClickHouseConfig;
use crate::error::ChormResult;
use crate::value::Row;
use async_trait::async_trait;

/// Raw outcome of one statement as reported by a transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    /// SQL actually sent to the server.
    pub sql: String,
    /// Result rows (empty for writes).
    pub rows: Vec<Row>,
    /// Server-side error message, if the statement failed.
    pub error: Option<String>,
}

impl Statement {
    /// A successful statement.
    pub fn ok(sql: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            sql: sql.into(),
            rows,
            error: None,
        }
    }

    /// A statement the server rejected.
    pub fn failed(sql: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            rows: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// An established connection to a ClickHouse server.
///
/// Server-side statement errors are reported inside [`Statement::error`];
/// `Err` is reserved for connectivity and protocol failures.
pub trait Transport: Send + Sync + 'static {
    /// Run a query that returns rows.
    fn select(&self, sql: &str) -> impl std::future::Future<Output = ChormResult<Statement>> + Send;

    /// Run a statement that returns no rows (DDL, mutations).
    fn write(&self, sql: &str) -> impl std::future::Future<Output = ChormResult<Statement>> + Send;

    /// Insert rows into `table`, restricted to `columns`.
    fn insert(
        &self,
        table: &str,
        rows: &[Row],
        columns: &[&str],
    ) -> impl std::future::Future<Output = ChormResult<Statement>> + Send;

    /// Check that the server answers.
    fn ping(&self) -> impl std::future::Future<Output = ChormResult<bool>> + Send;

    /// Names of the tables in the configured database.
    fn show_tables(&self) -> impl std::future::Future<Output = ChormResult<Vec<String>>> + Send;
}

/// Opens a transport from configuration.
#[async_trait]
pub trait Connect<T: Transport>: Send + Sync {
    async fn connect(&self, config: &ClickHouseConfig) -> ChormResult<T>;
}
