//! Client adapter over a lazily connected [`Transport`].

use crate::config::{AwaitPolicy, ClickHouseConfig};
use crate::error::{ChormError, ChormResult};
use crate::params::bind_params;
use crate::response::{Response, SyncResponse};
use crate::transport::{Connect, Statement, Transport};
use crate::value::{Params, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

const MAX_LOGGED_SQL: usize = 200;

const WHERE_KEYWORD: &[u8] = b" WHERE ";

/// Byte offsets of every ` WHERE ` (any case) outside single-quoted literals.
///
/// Inside a literal, `\` escapes the next byte; `''` closes and reopens it.
fn unquoted_where_offsets(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut offsets = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_literal {
            match b {
                b'\\' => i += 1,
                b'\'' => in_literal = false,
                _ => {}
            }
        } else if b == b'\'' {
            in_literal = true;
        } else if bytes[i..]
            .get(..WHERE_KEYWORD.len())
            .is_some_and(|w| w.eq_ignore_ascii_case(WHERE_KEYWORD))
        {
            offsets.push(i);
            i += WHERE_KEYWORD.len();
            continue;
        }
        i += 1;
    }
    offsets
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Tag a mutating statement so its completion can be found later.
///
/// Every ` WHERE ` keyword is rewritten into `WHERE ('<uuid>' = '<uuid>') AND `,
/// a no-op predicate that embeds the tag verbatim in the statement text.
/// Text inside string literals is left alone. Statements without a `WHERE`
/// clause are rejected.
pub fn make_query_awaitable(sql: &str) -> ChormResult<(Uuid, String)> {
    let offsets = unquoted_where_offsets(sql);
    if offsets.is_empty() {
        return Err(ChormError::bad_request(
            "queries without `WHERE` condition are not awaitable, use a plain query instead.",
        ));
    }
    let tag = Uuid::new_v4();
    let predicate = format!(" WHERE ('{tag}' = '{tag}') AND ");

    let mut tagged = String::with_capacity(sql.len() + offsets.len() * predicate.len());
    let mut last = 0;
    for offset in offsets {
        tagged.push_str(&sql[last..offset]);
        tagged.push_str(&predicate);
        last = offset + WHERE_KEYWORD.len();
    }
    tagged.push_str(&sql[last..]);
    Ok((tag, tagged))
}

struct ClientInner<T: Transport> {
    config: Option<ClickHouseConfig>,
    connector: Option<Box<dyn Connect<T>>>,
    transport: OnceCell<T>,
}

/// Shared handle to a ClickHouse connection.
///
/// The connection is opened on first use, exactly once even under concurrent
/// first calls, and must answer a ping before it is handed out. Cloning is
/// cheap and every clone shares the same connection.
pub struct ClickHouseClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
    await_policy: AwaitPolicy,
}

impl<T: Transport> Clone for ClickHouseClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            await_policy: self.await_policy,
        }
    }
}

impl<T: Transport> ClickHouseClient<T> {
    /// Client connecting with an explicit configuration.
    pub fn new(config: ClickHouseConfig, connector: impl Connect<T> + 'static) -> Self {
        let await_policy = config.await_policy;
        Self {
            inner: Arc::new(ClientInner {
                config: Some(config),
                connector: Some(Box::new(connector)),
                transport: OnceCell::new(),
            }),
            await_policy,
        }
    }

    /// Client reading [`ClickHouseConfig::global`] when it first connects.
    pub fn from_env(connector: impl Connect<T> + 'static) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config: None,
                connector: Some(Box::new(connector)),
                transport: OnceCell::new(),
            }),
            await_policy: AwaitPolicy::default(),
        }
    }

    /// Client over an already established transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config: None,
                connector: None,
                transport: OnceCell::new_with(Some(transport)),
            }),
            await_policy: AwaitPolicy::default(),
        }
    }

    /// Override how awaitable mutations are polled.
    pub fn with_await_policy(mut self, policy: AwaitPolicy) -> Self {
        self.await_policy = policy;
        self
    }

    pub fn await_policy(&self) -> AwaitPolicy {
        self.await_policy
    }

    async fn transport(&self) -> ChormResult<&T> {
        self.inner.transport.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> ChormResult<T> {
        let Some(connector) = self.inner.connector.as_deref() else {
            return Err(ChormError::NotImplemented(
                "no connector configured for this client".to_string(),
            ));
        };
        let config = match &self.inner.config {
            Some(config) => config,
            None => ClickHouseConfig::global()?,
        };

        let transport = connector.connect(config).await?;
        if !transport.ping().await? {
            tracing::warn!(target: "chorm", address = %config.address(), "ping failed");
            return Err(ChormError::transport("ping database failed."));
        }
        tracing::info!(
            target: "chorm",
            address = %config.address(),
            database = %config.database,
            "connected to clickhouse"
        );
        Ok(transport)
    }

    fn trace(kind: &'static str, statement: &Statement) {
        let sql = truncate_sql_bytes(&statement.sql, MAX_LOGGED_SQL);
        match &statement.error {
            None => tracing::debug!(target: "chorm.sql", kind, sql = %sql),
            Some(error) => tracing::warn!(target: "chorm.sql", kind, sql = %sql, error = %error, "statement failed"),
        }
    }

    /// Run a row-returning query after binding `params`.
    pub async fn select(&self, sql: &str, params: &Params) -> ChormResult<Response> {
        let sql = bind_params(sql, params)?;
        let statement = self.transport().await?.select(&sql).await?;
        Self::trace("select", &statement);
        Ok(Response::from(statement))
    }

    /// Run a statement that returns no rows after binding `params`.
    pub async fn query(&self, sql: &str, params: &Params) -> ChormResult<Response> {
        let sql = bind_params(sql, params)?;
        let statement = self.transport().await?.write(&sql).await?;
        Self::trace("write", &statement);
        Ok(Response::from(statement))
    }

    /// Run a tagged mutation whose completion can be awaited.
    pub async fn query_awaitable(&self, sql: &str, params: &Params) -> ChormResult<SyncResponse<T>> {
        let sql = bind_params(sql, params)?;
        let (tag, sql) = make_query_awaitable(&sql)?;
        let statement = self.transport().await?.write(&sql).await?;
        Self::trace("write", &statement);
        Ok(SyncResponse::new(Response::from(statement), tag, self.clone()))
    }

    /// Track a mutation tagged earlier, e.g. by another process.
    pub fn track(&self, tag: Uuid) -> SyncResponse<T> {
        SyncResponse::new(Response::from(Statement::default()), tag, self.clone())
    }

    /// Insert already normalized rows.
    pub async fn insert(&self, table: &str, rows: &[Row], columns: &[&str]) -> ChormResult<Response> {
        let statement = self.transport().await?.insert(table, rows, columns).await?;
        Self::trace("insert", &statement);
        Ok(Response::from(statement))
    }

    pub async fn ping(&self) -> ChormResult<bool> {
        self.transport().await?.ping().await
    }

    pub async fn show_tables(&self) -> ChormResult<Vec<String>> {
        self.transport().await?.show_tables().await
    }
}
