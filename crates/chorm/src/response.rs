//! Statement responses and mutation completion polling.

use crate::client::ClickHouseClient;
use crate::error::{ChormError, ChormResult};
use crate::transport::{Statement, Transport};
use crate::value::{Params, Row};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lookup against the server's mutation log.
pub const MUTATION_STATUS_SQL: &str =
    "SELECT is_done FROM system.mutations WHERE command LIKE :queryUniqueKey LIMIT 1";

/// Result of one executed statement. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    statement: Statement,
}

impl Response {
    pub fn new(statement: Statement) -> Self {
        Self { statement }
    }

    pub fn rows(&self) -> &[Row] {
        &self.statement.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.statement.rows
    }

    /// First row, if any.
    pub fn fetch_row(&self) -> Option<&Row> {
        self.statement.rows.first()
    }

    /// `column` of the first row, if any.
    pub fn fetch_one(&self, column: &str) -> Option<&Value> {
        self.fetch_row().and_then(|row| row.get(column))
    }

    /// Rows nested by the values of the `path` columns.
    ///
    /// Each level is keyed by the text of one column; the leaf holds the row.
    /// Later rows replace earlier ones at the same leaf, and rows lacking a
    /// path column are skipped.
    pub fn rows_as_tree(&self, path: &[&str]) -> Map<String, Value> {
        let mut tree = Map::new();
        'rows: for row in self.rows() {
            let Some(keys) = path
                .iter()
                .map(|column| row.get(*column).map(tree_key))
                .collect::<Option<Vec<String>>>()
            else {
                continue;
            };
            let Some((leaf, branches)) = keys.split_last() else {
                break;
            };

            let mut node = &mut tree;
            for key in branches {
                let entry = node
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                node = match entry {
                    Value::Object(next) => next,
                    _ => continue 'rows,
                };
            }
            node.insert(leaf.clone(), Value::Object(row.clone()));
        }
        tree
    }

    pub fn is_error(&self) -> bool {
        self.statement.error.is_some()
    }

    /// Server error message, if the statement failed.
    pub fn error(&self) -> Option<&str> {
        self.statement.error.as_deref()
    }

    /// SQL that was sent.
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    /// Plain responses cannot be awaited.
    pub fn is_syncable(&self) -> bool {
        false
    }
}

impl From<Statement> for Response {
    fn from(statement: Statement) -> Self {
        Self::new(statement)
    }
}

/// Where an awaited mutation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Done,
    TimedOut,
}

/// Response of a tagged mutation whose completion can be polled.
///
/// The tag is embedded in the statement text, so the mutation can be found in
/// `system.mutations` by a `LIKE` lookup on its command.
pub struct SyncResponse<T: Transport> {
    response: Response,
    tag: Uuid,
    client: ClickHouseClient<T>,
}

impl<T: Transport> Clone for SyncResponse<T> {
    fn clone(&self) -> Self {
        Self {
            response: self.response.clone(),
            tag: self.tag,
            client: self.client.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for SyncResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncResponse")
            .field("response", &self.response)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SyncResponse<T> {
    pub(crate) fn new(response: Response, tag: Uuid, client: ClickHouseClient<T>) -> Self {
        Self {
            response,
            tag,
            client,
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// Unique key embedded in the statement.
    pub fn tag(&self) -> Uuid {
        self.tag
    }

    pub fn is_error(&self) -> bool {
        self.response.is_error()
    }

    pub fn sql(&self) -> &str {
        self.response.sql()
    }

    pub fn is_syncable(&self) -> bool {
        true
    }

    /// Whether the server reports the mutation as finished.
    ///
    /// A mutation not yet listed in `system.mutations` counts as not done.
    pub async fn is_done(&self) -> ChormResult<bool> {
        mutation_is_done(&self.client, self.tag).await
    }

    /// One lookup: `Done` or still `Pending`.
    pub async fn state(&self) -> ChormResult<MutationState> {
        Ok(if self.is_done().await? {
            MutationState::Done
        } else {
            MutationState::Pending
        })
    }

    /// Poll until done or `timeout` elapses (default from the client's
    /// await policy). Returns whether the mutation completed in time.
    pub async fn await_done(&self, timeout: Option<Duration>) -> ChormResult<bool> {
        let state = self.poll(timeout, None).await?;
        Ok(state == MutationState::Done)
    }

    /// [`SyncResponse::await_done`], aborting with `Cancelled` once `cancel` fires.
    pub async fn await_with_cancel(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ChormResult<bool> {
        let state = self.poll(timeout, Some(cancel)).await?;
        Ok(state == MutationState::Done)
    }

    /// Drive the poll loop and report the terminal state.
    pub async fn poll(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> ChormResult<MutationState> {
        let policy = self.client.await_policy();
        let deadline = Instant::now() + timeout.unwrap_or(policy.timeout);

        loop {
            check_cancelled(cancel, self.tag)?;
            if self.is_done().await? {
                return Ok(MutationState::Done);
            }
            pause(policy.poll_interval, cancel, self.tag).await?;
            if Instant::now() >= deadline {
                tracing::warn!(target: "chorm", tag = %self.tag, "mutation await timed out");
                return Ok(MutationState::TimedOut);
            }
        }
    }
}

pub(crate) async fn mutation_is_done<T: Transport>(
    client: &ClickHouseClient<T>,
    tag: Uuid,
) -> ChormResult<bool> {
    let params = Params::new().with("queryUniqueKey", format!("%{tag}%"));
    let response = client.select(MUTATION_STATUS_SQL, &params).await?;
    if let Some(message) = response.error() {
        return Err(ChormError::transport(format!(
            "mutation status lookup failed: {message}"
        )));
    }
    Ok(response.fetch_one("is_done").is_some_and(is_truthy))
}

fn tree_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

pub(crate) fn check_cancelled(cancel: Option<&CancellationToken>, tag: Uuid) -> ChormResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(ChormError::Cancelled(format!(
            "await of mutation {tag} cancelled"
        ))),
        _ => Ok(()),
    }
}

/// Sleep for `interval`, waking early if `cancel` fires.
pub(crate) async fn pause(
    interval: Duration,
    cancel: Option<&CancellationToken>,
    tag: Uuid,
) -> ChormResult<()> {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => check_cancelled(cancel, tag),
                _ = tokio::time::sleep(interval) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(interval).await;
            Ok(())
        }
    }
}
