//! ClickHouse HTTP interface transport.
//!
//! Every call opens a fresh connection, sends one HTTP/1.1 request with
//! `Connection: close` and reads the reply to EOF. Row data travels as
//! `JSONEachRow`.

use crate::config::ClickHouseConfig;
use crate::error::{ChormError, ChormResult};
use crate::transport::{Connect, Statement, Transport};
use crate::value::Row;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Request path; 64-bit integers come back as JSON numbers instead of strings.
const QUERY_PATH: &str = "/?output_format_json_quote_64bit_integers=0";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A decoded HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport speaking ClickHouse's HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClickHouseConfig,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: ClickHouseConfig) -> Self {
        Self {
            config,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Upper bound for one request, connect to last byte.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn send(&self, method: &str, path: &str, body: &str) -> ChormResult<HttpReply> {
        tokio::time::timeout(self.request_timeout, self.exchange(method, path, body))
            .await
            .map_err(|_| {
                ChormError::transport(format!(
                    "request timed out after {:?}",
                    self.request_timeout
                ))
            })?
    }

    async fn exchange(&self, method: &str, path: &str, body: &str) -> ChormResult<HttpReply> {
        let address = self.config.address();
        let mut stream = TcpStream::connect(&address)
            .await
            .map_err(|e| ChormError::transport_io(format!("connect to {address}"), e))?;

        let request = build_request(method, path, &self.config, body);
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| ChormError::transport_io("send request", e))?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|e| ChormError::transport_io("read reply", e))?;
        parse_reply(&raw)
    }

    async fn execute(&self, sql: &str, body: &str, parse_rows: bool) -> ChormResult<Statement> {
        let reply = self.send("POST", QUERY_PATH, body).await?;
        if !reply.is_success() {
            return Ok(Statement::failed(sql, reply.body.trim()));
        }
        let rows = if parse_rows {
            parse_json_each_row(&reply.body)?
        } else {
            Vec::new()
        };
        Ok(Statement::ok(sql, rows))
    }
}

impl Transport for HttpTransport {
    async fn select(&self, sql: &str) -> ChormResult<Statement> {
        let body = format!("{} FORMAT JSONEachRow", strip_terminator(sql));
        self.execute(sql, &body, true).await
    }

    async fn write(&self, sql: &str) -> ChormResult<Statement> {
        self.execute(sql, sql, false).await
    }

    async fn insert(&self, table: &str, rows: &[Row], columns: &[&str]) -> ChormResult<Statement> {
        let sql = format!(
            "INSERT INTO {table} ({}) FORMAT JSONEachRow",
            columns.join(",")
        );
        let mut body = sql.clone();
        body.push('\n');
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| ChormError::normalization(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }
        self.execute(&sql, &body, false).await
    }

    async fn ping(&self) -> ChormResult<bool> {
        let reply = self.send("GET", "/ping", "").await?;
        Ok(reply.status == 200 && reply.body.trim_start().starts_with("Ok."))
    }

    async fn show_tables(&self) -> ChormResult<Vec<String>> {
        let statement = self.select("SHOW TABLES").await?;
        if let Some(error) = statement.error {
            return Err(ChormError::transport(format!("SHOW TABLES failed: {error}")));
        }
        Ok(statement
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

/// Connects [`HttpTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

#[async_trait]
impl Connect<HttpTransport> for HttpConnector {
    async fn connect(&self, config: &ClickHouseConfig) -> ChormResult<HttpTransport> {
        Ok(HttpTransport::new(config.clone()))
    }
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';').trim_end()
}

pub(crate) fn build_request(method: &str, path: &str, config: &ClickHouseConfig, body: &str) -> String {
    format!(
        "{method} {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         X-ClickHouse-User: {user}\r\n\
         X-ClickHouse-Key: {key}\r\n\
         X-ClickHouse-Database: {db}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        host = config.host,
        port = config.port,
        user = config.username,
        key = config.password,
        db = config.database,
        len = body.len(),
    )
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn parse_reply(raw: &[u8]) -> ChormResult<HttpReply> {
    let Some(split) = find_subslice(raw, b"\r\n\r\n") else {
        return Err(ChormError::transport("malformed HTTP reply: no header terminator"));
    };
    let head = String::from_utf8_lossy(&raw[..split]);
    let payload = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ChormError::transport(format!("malformed status line: `{status_line}`")))?;

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.to_ascii_lowercase().contains("chunked")
        })
    });

    let body = if chunked {
        decode_chunked(payload)?
    } else {
        payload.to_vec()
    };
    let body = String::from_utf8(body)
        .map_err(|e| ChormError::transport(format!("reply body is not UTF-8: {e}")))?;
    Ok(HttpReply { status, body })
}

fn decode_chunked(mut data: &[u8]) -> ChormResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    loop {
        let Some(eol) = find_subslice(data, b"\r\n") else {
            return Err(ChormError::transport("truncated chunked body"));
        };
        let size_line = String::from_utf8_lossy(&data[..eol]);
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| ChormError::transport(format!("bad chunk size `{size_hex}`")))?;
        data = &data[eol + 2..];
        if size == 0 {
            return Ok(out);
        }
        if data.len() < size {
            return Err(ChormError::transport("truncated chunked body"));
        }
        out.extend_from_slice(&data[..size]);
        data = data[size..].strip_prefix(b"\r\n").unwrap_or(&data[size..]);
    }
}

pub(crate) fn parse_json_each_row(body: &str) -> ChormResult<Vec<Row>> {
    let mut rows = Vec::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(row)) => rows.push(row),
            Ok(other) => {
                return Err(ChormError::transport(format!(
                    "expected a JSON object per row, got `{other}`"
                )));
            }
            Err(e) => return Err(ChormError::transport(format!("invalid JSONEachRow line: {e}"))),
        }
    }
    Ok(rows)
}
