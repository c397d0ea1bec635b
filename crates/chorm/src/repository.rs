//! Entity repository: finders, inserts and diff-based updates.

use crate::builder::{build_update_statements, limit_clause, offset_clause, order_by_clause, where_clause};
use crate::client::ClickHouseClient;
use crate::entity::{Entity, resolve_table};
use crate::error::{ChormError, ChormResult};
use crate::mapper::{denormalize, normalize};
use crate::params::{quote_literal, resolve_query_params};
use crate::response::{Response, SyncResponse, check_cancelled, pause};
use crate::transport::Transport;
use crate::value::{Criteria, EntityId, OrderBy, Param, Params, Row};
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const FIND_TEMPLATE: &str = "SELECT * FROM {table} {where} {orderBy} {limit} {offset}";
const CURRENT_ROWS_TEMPLATE: &str = "SELECT * FROM {table} WHERE id IN ({ids})";

/// Repository for one entity type over a shared [`ClickHouseClient`].
///
/// ```ignore
/// let client = ClickHouseClient::from_env(HttpConnector);
/// let events: Repository<Event, _> = Repository::new(client);
///
/// let active = events
///     .find_by(
///         &Criteria::new().with("status", Param::literal("active")),
///         Some(&OrderBy::new().desc("created_at")),
///         Some(10),
///         None,
///     )
///     .await?;
/// ```
pub struct Repository<E: Entity, T: Transport> {
    client: ClickHouseClient<T>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, T: Transport> Clone for Repository<E, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, T: Transport> Repository<E, T> {
    pub fn new(client: ClickHouseClient<T>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    pub fn client(&self) -> &ClickHouseClient<T> {
        &self.client
    }

    pub fn table_name(&self) -> ChormResult<String> {
        resolve_table::<E>()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        E::columns()
    }

    /// Run a row-returning query; `{table}` resolves to this entity's table.
    pub async fn select(&self, sql: &str, params: &Params) -> ChormResult<Response> {
        let sql = resolve_query_params(sql, params, &self.table_name()?)?;
        self.client.select(&sql, &Params::new()).await
    }

    /// Run a write statement; `{table}` resolves to this entity's table.
    pub async fn query(&self, sql: &str, params: &Params) -> ChormResult<Response> {
        let sql = resolve_query_params(sql, params, &self.table_name()?)?;
        self.client.query(&sql, &Params::new()).await
    }

    /// Run a tagged mutation whose completion can be awaited.
    pub async fn query_awaitable(&self, sql: &str, params: &Params) -> ChormResult<SyncResponse<T>> {
        let sql = resolve_query_params(sql, params, &self.table_name()?)?;
        self.client.query_awaitable(&sql, &Params::new()).await
    }

    /// Find by identifier. The id is always compared as a quoted string.
    pub async fn find(&self, id: impl Into<EntityId>) -> ChormResult<Option<E>> {
        let id = id.into();
        self.find_one_by(&Criteria::new().with("id", Param::literal(id.to_string())))
            .await
    }

    /// First entity matching `criteria`; no match is `Ok(None)`.
    pub async fn find_one_by(&self, criteria: &Criteria) -> ChormResult<Option<E>> {
        let found = self.find_by(criteria, None, Some(1), None).await?;
        Ok(found.into_iter().next())
    }

    pub async fn find_all(&self, order_by: Option<&OrderBy>) -> ChormResult<Vec<E>> {
        self.find_by(&Criteria::new(), order_by, None, None).await
    }

    /// Entities matching every criterion.
    ///
    /// Criteria values are substituted raw (`col = {col}`); wrap strings with
    /// [`Param::literal`].
    pub async fn find_by(
        &self,
        criteria: &Criteria,
        order_by: Option<&OrderBy>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ChormResult<Vec<E>> {
        let params = Params::new()
            .with("where", where_clause(criteria))
            .with("orderBy", order_by_clause(order_by))
            .with("limit", limit_clause(limit))
            .with("offset", offset_clause(offset))
            .merge(criteria);

        let rows = rows_or_error(self.select(FIND_TEMPLATE, &params).await?)?;
        Ok(denormalize::<E>(rows)?.into_vec())
    }

    /// Insert entities. Null identifiers are replaced by fresh v4 UUIDs.
    pub async fn insert(&self, items: &[E]) -> ChormResult<Response> {
        if items.is_empty() {
            return Err(ChormError::bad_request(
                "bad request. Attempted to store empty dataset.",
            ));
        }
        let table = self.table_name()?;
        let mut rows = normalize(items)?;
        assign_missing_ids::<E>(&mut rows);
        self.client.insert(&table, &rows, E::columns()).await
    }

    /// Apply field-level changes of `items` to their stored rows.
    ///
    /// One `ALTER TABLE ... UPDATE` is issued per changed entity; unchanged
    /// entities issue nothing. Returns `false` if any statement failed. With
    /// `awaitable`, waits until every issued mutation is reported done, bounded
    /// by the client's await timeout; unfinished mutations also yield `false`.
    pub async fn update(&self, items: &[E], awaitable: bool) -> ChormResult<bool> {
        self.update_inner(items, awaitable, None).await
    }

    /// [`Repository::update`], with a token checked at every poll iteration.
    pub async fn update_with_cancel(
        &self,
        items: &[E],
        awaitable: bool,
        cancel: &CancellationToken,
    ) -> ChormResult<bool> {
        self.update_inner(items, awaitable, Some(cancel)).await
    }

    async fn update_inner(
        &self,
        items: &[E],
        awaitable: bool,
        cancel: Option<&CancellationToken>,
    ) -> ChormResult<bool> {
        if items.is_empty() {
            return Err(ChormError::bad_request(
                "bad request. Attempted to update by empty dataset.",
            ));
        }

        let table = self.table_name()?;
        let current = self.fetch_current(items).await?;
        let statements = build_update_statements(items, &current, &table)?;

        let mut success = true;
        if !awaitable {
            for sql in &statements {
                if self.client.query(sql, &Params::new()).await?.is_error() {
                    success = false;
                }
            }
            return Ok(success);
        }

        let mut pending = VecDeque::with_capacity(statements.len());
        for sql in &statements {
            let response = self.client.query_awaitable(sql, &Params::new()).await?;
            if response.is_error() {
                success = false;
            } else {
                pending.push_back(response);
            }
        }

        if !self.await_all(pending, cancel).await? {
            success = false;
        }
        Ok(success)
    }

    async fn fetch_current(&self, items: &[E]) -> ChormResult<Vec<E>> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.id() else {
                return Err(ChormError::bad_request(format!(
                    "unable to update `{}` without an identifier.",
                    E::entity_name()
                )));
            };
            ids.push(quote_literal(&id.to_string()));
        }

        let params = Params::new().with("ids", ids.join(","));
        let rows = rows_or_error(self.select(CURRENT_ROWS_TEMPLATE, &params).await?)?;
        Ok(denormalize::<E>(rows)?.into_vec())
    }

    /// Round-robin over pending mutations until all are done or the deadline passes.
    async fn await_all(
        &self,
        mut pending: VecDeque<SyncResponse<T>>,
        cancel: Option<&CancellationToken>,
    ) -> ChormResult<bool> {
        let policy = self.client.await_policy();
        let deadline = Instant::now() + policy.timeout;

        while let Some(statement) = pending.pop_front() {
            let tag = statement.tag();
            check_cancelled(cancel, tag)?;
            if statement.is_done().await? {
                continue;
            }
            pending.push_back(statement);
            pause(policy.poll_interval, cancel, tag).await?;
            if Instant::now() >= deadline {
                let remaining: Vec<String> = pending.iter().map(|s| s.tag().to_string()).collect();
                tracing::warn!(
                    target: "chorm",
                    table = %E::table_name(),
                    remaining = ?remaining,
                    "mutations still pending at await deadline"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn rows_or_error(response: Response) -> ChormResult<Vec<Row>> {
    if let Some(message) = response.error() {
        return Err(ChormError::transport(format!(
            "statement failed: {message} ({})",
            response.sql()
        )));
    }
    Ok(response.into_rows())
}

fn assign_missing_ids<E: Entity>(rows: &mut [Row]) {
    if !E::columns().contains(&"id") {
        return;
    }
    for row in rows {
        if row.get("id").is_none_or(Value::is_null) {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
    }
}
