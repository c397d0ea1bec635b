#![allow(dead_code)]

use async_trait::async_trait;
use chorm::{ChormResult, ClickHouseConfig, Connect, Entity, EntityId, Row, Statement, Transport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type Handler = Arc<dyn Fn(&str) -> Statement + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub hits: i64,
}

impl Entity for Event {
    fn columns() -> &'static [&'static str] {
        &["id", "status", "created_at", "hits"]
    }

    fn id(&self) -> Option<EntityId> {
        self.id.clone().map(EntityId::Str)
    }
}

pub fn event(id: &str, status: &str, hits: i64) -> Event {
    Event {
        id: Some(id.to_string()),
        status: status.to_string(),
        created_at: "2026-01-01 00:00:00".to_string(),
        hits,
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn event_row(e: &Event) -> Row {
    row(serde_json::to_value(e).unwrap())
}

/// Transport that records every statement and answers from scripted handlers.
#[derive(Clone)]
pub struct MockTransport {
    log: Arc<Mutex<Vec<String>>>,
    inserted: Arc<Mutex<Vec<Row>>>,
    select: Handler,
    write: Handler,
    ping_ok: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            inserted: Arc::default(),
            select: Arc::new(|sql: &str| Statement::ok(sql, Vec::new())),
            write: Arc::new(|sql: &str| Statement::ok(sql, Vec::new())),
            ping_ok: true,
        }
    }

    pub fn on_select(mut self, f: impl Fn(&str) -> Statement + Send + Sync + 'static) -> Self {
        self.select = Arc::new(f);
        self
    }

    pub fn on_write(mut self, f: impl Fn(&str) -> Statement + Send + Sync + 'static) -> Self {
        self.write = Arc::new(f);
        self
    }

    pub fn failing_ping(mut self) -> Self {
        self.ping_ok = false;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("ALTER") || s.starts_with("INSERT"))
            .collect()
    }

    pub fn inserted(&self) -> Vec<Row> {
        self.inserted.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.log.lock().unwrap().push(sql.to_string());
    }
}

impl Transport for MockTransport {
    async fn select(&self, sql: &str) -> ChormResult<Statement> {
        self.record(sql);
        Ok((self.select)(sql))
    }

    async fn write(&self, sql: &str) -> ChormResult<Statement> {
        self.record(sql);
        Ok((self.write)(sql))
    }

    async fn insert(&self, table: &str, rows: &[Row], columns: &[&str]) -> ChormResult<Statement> {
        let sql = format!("INSERT INTO {table} ({}) FORMAT JSONEachRow", columns.join(","));
        self.record(&sql);
        self.inserted.lock().unwrap().extend_from_slice(rows);
        Ok(Statement::ok(sql, Vec::new()))
    }

    async fn ping(&self) -> ChormResult<bool> {
        Ok(self.ping_ok)
    }

    async fn show_tables(&self) -> ChormResult<Vec<String>> {
        Ok(vec!["event".to_string()])
    }
}

/// Hands out clones of one transport and counts connection attempts.
pub struct MockConnector {
    pub transport: MockTransport,
    pub calls: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl Connect<MockTransport> for MockConnector {
    async fn connect(&self, _config: &ClickHouseConfig) -> ChormResult<MockTransport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.transport.clone())
    }
}
