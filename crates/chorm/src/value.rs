//! Values passed into and read out of queries.

use crate::error::{ChormError, ChormResult};
use crate::params::quote_literal;
use serde_json::Value;
use std::fmt;

/// A column-keyed result row or normalized entity.
pub type Row = serde_json::Map<String, Value>;

/// A query parameter: a scalar, or a list rendered comma-joined.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Param>),
}

impl Param {
    /// A string value pre-wrapped in single quotes, for raw `{name}` slots.
    pub fn literal(value: impl AsRef<str>) -> Self {
        Self::Str(quote_literal(value.as_ref()))
    }

    /// Text form used for substitution into a template.
    ///
    /// Lists are joined with `,`. Only scalars may appear inside a list.
    pub fn render(&self) -> ChormResult<String> {
        match self {
            Self::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.render_scalar()?);
                }
                Ok(parts.join(","))
            }
            scalar => scalar.render_scalar(),
        }
    }

    fn render_scalar(&self) -> ChormResult<String> {
        Ok(match self {
            Self::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(v) => v.clone(),
            Self::List(_) => {
                return Err(ChormError::bad_request(format!(
                    "Parameter must be a scalar or array type, `{}` passed.",
                    self.type_name()
                )));
            }
        })
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "double",
            Self::Str(_) => "string",
            Self::List(_) => "array",
        }
    }
}

macro_rules! impl_param_from {
    ($variant:ident: $($ty:ty),+) => {
        $(impl From<$ty> for Param {
            fn from(v: $ty) -> Self {
                Self::$variant(v.into())
            }
        })+
    };
}

impl_param_from!(Bool: bool);
impl_param_from!(Int: i8, i16, i32, i64);
impl_param_from!(UInt: u8, u16, u32, u64);
impl_param_from!(Float: f32, f64);
impl_param_from!(Str: String, &str);

impl From<usize> for Param {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<uuid::Uuid> for Param {
    fn from(v: uuid::Uuid) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<EntityId> for Param {
    fn from(v: EntityId) -> Self {
        match v {
            EntityId::Int(i) => Self::Int(i),
            EntityId::Str(s) => Self::Str(s),
        }
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Ordered name → [`Param`] mapping.
///
/// Insertion order is kept; setting an existing name replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Param)>,
}

/// Column → value equality criteria for `WHERE` clauses.
pub type Criteria = Params;

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Params::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Insert an entry ahead of all others.
    pub fn prepend(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.insert(0, (name, value.into()));
    }

    /// Append every entry of `other`, replacing names already present.
    pub fn merge(mut self, other: &Params) -> Self {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// Ordered column → direction mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    columns: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, column: impl Into<String>) -> Self {
        self.then(column, Direction::Asc)
    }

    pub fn desc(self, column: impl Into<String>) -> Self {
        self.then(column, Direction::Desc)
    }

    /// Append a column, replacing its direction if already listed.
    pub fn then(mut self, column: impl Into<String>, direction: Direction) -> Self {
        let column = column.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = direction,
            None => self.columns.push((column, direction)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.columns.iter().map(|(c, d)| (c.as_str(), *d))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Entity identifier: integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for EntityId {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<uuid::Uuid> for EntityId {
    fn from(v: uuid::Uuid) -> Self {
        Self::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_param_renders_comma_joined() {
        let p = Param::from(vec![1, 2, 3]);
        assert_eq!(p.render().unwrap(), "1,2,3");
        let p = Param::from(vec!["'a'", "'b'"]);
        assert_eq!(p.render().unwrap(), "'a','b'");
    }

    #[test]
    fn nested_list_is_rejected() {
        let p = Param::List(vec![Param::from(vec![1])]);
        let err = p.render().unwrap_err();
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("`array` passed"));
    }

    #[test]
    fn literal_is_quoted_and_escaped() {
        assert_eq!(Param::literal("active"), Param::Str("'active'".into()));
        assert_eq!(Param::literal("o'k").render().unwrap(), r"'o\'k'");
    }

    #[test]
    fn bool_renders_as_digit() {
        assert_eq!(Param::from(true).render().unwrap(), "1");
        assert_eq!(Param::from(false).render().unwrap(), "0");
    }

    #[test]
    fn params_keep_insertion_order_and_replace_in_place() {
        let mut p = Params::new().with("b", 1).with("a", 2);
        p.set("b", 3);
        p.prepend("table", "events");
        let keys: Vec<_> = p.keys().collect();
        assert_eq!(keys, ["table", "b", "a"]);
        assert_eq!(p.get("b"), Some(&Param::Int(3)));
    }

    #[test]
    fn order_by_replaces_direction() {
        let o = OrderBy::new().asc("a").desc("b").desc("a");
        let cols: Vec<_> = o.iter().collect();
        assert_eq!(cols, [("a", Direction::Desc), ("b", Direction::Desc)]);
    }

    #[test]
    fn entity_id_displays_raw_value() {
        assert_eq!(EntityId::Int(7).to_string(), "7");
        assert_eq!(EntityId::from("x").to_string(), "x");
    }
}
