//! SQL fragment builders.
//!
//! Clause builders emit raw `{column}` placeholders; values are substituted
//! afterwards by [`crate::params`].

use crate::entity::Entity;
use crate::error::ChormResult;
use crate::mapper::diff;
use crate::params::{bind_params, resolve_query_params};
use crate::value::{OrderBy, Param, Params};
use serde_json::Value;

/// Template used for one diff-based mutation.
pub const UPDATE_TEMPLATE: &str = "ALTER TABLE {table} UPDATE {updatePropsSql} WHERE id = :id";

/// `" WHERE c1 = {c1} AND c2 = {c2}"`, or `""` for no criteria.
pub fn where_clause(criteria: &Params) -> String {
    if criteria.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = criteria.keys().map(|col| format!("{col} = {{{col}}}")).collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

/// `" ORDER BY c1 ASC, c2 DESC"`, or `""` when empty.
pub fn order_by_clause(order_by: Option<&OrderBy>) -> String {
    match order_by {
        Some(order) if !order.is_empty() => {
            let parts: Vec<String> = order.iter().map(|(col, dir)| format!("{col} {dir}")).collect();
            format!(" ORDER BY {}", parts.join(", "))
        }
        _ => String::new(),
    }
}

pub fn limit_clause(limit: Option<u64>) -> String {
    limit.map(|n| format!(" LIMIT {n} ")).unwrap_or_default()
}

pub fn offset_clause(offset: Option<u64>) -> String {
    offset.map(|n| format!(" OFFSET {n} ")).unwrap_or_default()
}

/// Text placed between the quotes of a `col='value'` assignment.
pub fn render_update_value(value: &Value) -> String {
    let text = match value {
        Value::Null => return "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    format!("'{out}'")
}

/// One `ALTER TABLE ... UPDATE` per entity whose fields changed.
///
/// Entities with no changes produce no statement.
pub fn build_update_statements<E: Entity>(
    items: &[E],
    current_items: &[E],
    table: &str,
) -> ChormResult<Vec<String>> {
    let mut statements = Vec::new();
    for (id, changed) in diff(items, current_items)? {
        if changed.is_empty() {
            continue;
        }
        let assignments: Vec<String> = changed
            .iter()
            .map(|(col, value)| format!("{col}={}", render_update_value(value)))
            .collect();
        // Assignments go in last so no later pass can rewrite tokens inside values.
        let id = Params::new().with("id", Param::from(id));
        let head = resolve_query_params(UPDATE_TEMPLATE, &id, table)?;
        let assignments = Params::new().with("updatePropsSql", assignments.join(","));
        statements.push(bind_params(&head, &assignments)?);
    }
    Ok(statements)
}
