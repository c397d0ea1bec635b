//! Named placeholder substitution.
//!
//! Two placeholder styles are recognised in SQL templates:
//!
//! - `:name` is replaced by the value as a quoted string literal
//! - `{name}` is replaced by the raw value (identifiers, clause fragments, sub-SQL)
//!
//! Names match case-insensitively and as whole tokens, so `:id` never touches
//! `:identifier`, and `::Type` casts are left alone. Parameters are applied in
//! order, one pass per name, so a fragment inserted by an earlier entry may carry
//! placeholders resolved by a later one.

use crate::error::ChormResult;
use crate::value::{Param, Params};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Name of the parameter carrying the entity's table.
pub const TABLE_PARAM: &str = "table";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<colon>::?)(?P<quoted>[A-Za-z_][A-Za-z0-9_]*)|\{(?P<raw>[A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("invalid built-in placeholder regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Quoted,
    Raw,
}

fn token_matches(caps: &Captures<'_>, name: &str, style: Style) -> bool {
    match style {
        Style::Quoted => {
            caps.name("colon").is_some_and(|c| c.as_str() == ":")
                && caps
                    .name("quoted")
                    .is_some_and(|n| n.as_str().eq_ignore_ascii_case(name))
        }
        Style::Raw => caps
            .name("raw")
            .is_some_and(|n| n.as_str().eq_ignore_ascii_case(name)),
    }
}

fn has_placeholder(sql: &str, name: &str, style: Style) -> bool {
    placeholder_re()
        .captures_iter(sql)
        .any(|caps| token_matches(&caps, name, style))
}

fn substitute(sql: &str, name: &str, style: Style, replacement: &str) -> String {
    placeholder_re()
        .replace_all(sql, |caps: &Captures<'_>| {
            if token_matches(caps, name, style) {
                replacement.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Wrap `value` in single quotes, escaping backslashes and quotes.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Substitute every parameter into `template`.
///
/// For each name, `:name` is tried first; `{name}` is only considered when no
/// `:name` token is present.
pub fn bind_params(template: &str, params: &Params) -> ChormResult<String> {
    if params.is_empty() {
        return Ok(template.to_string());
    }

    let mut sql = template.to_string();
    for (name, value) in params.iter() {
        let rendered = value.render()?;
        if has_placeholder(&sql, name, Style::Quoted) {
            sql = substitute(&sql, name, Style::Quoted, &quote_literal(&rendered));
        } else if has_placeholder(&sql, name, Style::Raw) {
            sql = substitute(&sql, name, Style::Raw, &rendered);
        }
    }
    Ok(sql)
}

/// Substitute `params` into `template`, injecting the entity table first.
///
/// When `params` is empty the template is returned untouched. Otherwise a
/// `table` entry is placed ahead of the others unless the caller already
/// supplied one.
pub fn resolve_query_params(template: &str, params: &Params, table: &str) -> ChormResult<String> {
    if params.is_empty() {
        return Ok(template.to_string());
    }

    let mut params = params.clone();
    if !params.contains(TABLE_PARAM) {
        params.prepend(TABLE_PARAM, Param::Str(table.to_string()));
    }
    bind_params(template, &params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_is_identity() {
        let t = "SELECT * FROM {table} WHERE id = :id";
        assert_eq!(resolve_query_params(t, &Params::new(), "user").unwrap(), t);
        assert_eq!(bind_params(t, &Params::new()).unwrap(), t);
    }

    #[test]
    fn quoted_and_table_substitution() {
        let sql = resolve_query_params(
            "SELECT * FROM {table} WHERE id = :id",
            &Params::new().with("id", 5),
            "user",
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM user WHERE id = '5'");
    }

    #[test]
    fn caller_supplied_table_wins() {
        let sql = resolve_query_params(
            "SELECT * FROM {table}",
            &Params::new().with("table", "archive"),
            "user",
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM archive");
    }

    #[test]
    fn value_equal_to_table_name_still_injects_table() {
        let sql = resolve_query_params(
            "SELECT * FROM {table} WHERE kind = :kind",
            &Params::new().with("kind", "user"),
            "user",
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM user WHERE kind = 'user'");
    }

    #[test]
    fn quoted_style_takes_precedence_over_raw() {
        let sql = bind_params("a = :x AND b = {x}", &Params::new().with("x", 1)).unwrap();
        assert_eq!(sql, "a = '1' AND b = {x}");
    }

    #[test]
    fn raw_style_is_unquoted() {
        let sql = bind_params("a IN ({ids})", &Params::new().with("ids", vec![1, 2])).unwrap();
        assert_eq!(sql, "a IN (1,2)");
    }

    #[test]
    fn names_match_case_insensitively() {
        let sql = bind_params("a = :ID OR b = {Id}", &Params::new().with("id", 3)).unwrap();
        assert_eq!(sql, "a = '3' OR b = {Id}");
        let sql = bind_params("b = {Id}", &Params::new().with("id", 3)).unwrap();
        assert_eq!(sql, "b = 3");
    }

    #[test]
    fn prefix_names_do_not_collide() {
        let sql = bind_params(
            "a = :id AND b = :identifier",
            &Params::new().with("id", 1).with("identifier", "x"),
        )
        .unwrap();
        assert_eq!(sql, "a = '1' AND b = 'x'");
    }

    #[test]
    fn casts_are_not_placeholders() {
        let sql = bind_params("SELECT x::String, :x", &Params::new().with("x", 2)).unwrap();
        assert_eq!(sql, "SELECT x::String, '2'");
    }

    #[test]
    fn fragments_resolve_in_later_passes() {
        let params = Params::new()
            .with("where", " WHERE status = {status}")
            .with("status", "'active'");
        let sql = bind_params("SELECT * FROM t {where}", &params).unwrap();
        assert_eq!(sql, "SELECT * FROM t  WHERE status = 'active'");
    }

    #[test]
    fn quoted_values_are_escaped() {
        let sql = bind_params("a = :v", &Params::new().with("v", "it's")).unwrap();
        assert_eq!(sql, r"a = 'it\'s'");
    }

    #[test]
    fn replacement_text_is_literal() {
        let sql = bind_params("a = {v}", &Params::new().with("v", "$1 ${x}")).unwrap();
        assert_eq!(sql, "a = $1 ${x}");
    }

    #[test]
    fn nested_list_fails_with_bad_request() {
        let params = Params::new().with("v", Param::List(vec![Param::List(vec![])]));
        let err = bind_params("a = {v}", &params).unwrap_err();
        assert!(err.is_bad_request());
    }
}
