//! Entity ⇄ row conversion and field-level diffing.

use crate::entity::Entity;
use crate::error::{ChormError, ChormResult};
use crate::value::{EntityId, Row};
use serde_json::Value;
use std::collections::HashMap;

/// Result of [`denormalize`]: a lone row yields a single entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Denormalized<E> {
    One(E),
    Many(Vec<E>),
}

impl<E> Denormalized<E> {
    /// Flatten into a sequence, wrapping a single entity.
    pub fn into_vec(self) -> Vec<E> {
        match self {
            Self::One(e) => vec![e],
            Self::Many(v) => v,
        }
    }
}

/// Convert one entity into a row holding exactly its declared columns.
pub fn normalize_one<E: Entity>(entity: &E) -> ChormResult<Row> {
    let value = serde_json::to_value(entity).map_err(|e| ChormError::normalization(e.to_string()))?;
    let Value::Object(mut raw) = value else {
        return Err(ChormError::normalization(format!(
            "unable to normalize `{}`: expected a field map.",
            E::entity_name()
        )));
    };

    let mut row = Row::new();
    for &column in E::columns() {
        let Some(v) = raw.remove(column) else {
            return Err(ChormError::mapping(E::entity_name(), column));
        };
        row.insert(column.to_string(), v);
    }
    Ok(row)
}

/// Convert entities into rows reduced to their declared columns.
///
/// Fails with `BadRequest` on empty input, `Normalization` when an entity does
/// not serialize to a field map and `Mapping` when a declared column is absent.
pub fn normalize<E: Entity>(entities: &[E]) -> ChormResult<Vec<Row>> {
    if entities.is_empty() {
        return Err(ChormError::bad_request("unable to store the empty data set."));
    }
    entities.iter().map(normalize_one).collect()
}

/// Build entities from result rows.
///
/// Exactly one row is unwrapped into [`Denormalized::One`]; any other count
/// yields [`Denormalized::Many`] in row order.
pub fn denormalize<E: Entity>(rows: Vec<Row>) -> ChormResult<Denormalized<E>> {
    let from_row = |row: Row| -> ChormResult<E> {
        serde_json::from_value(Value::Object(row)).map_err(ChormError::denormalization)
    };

    if rows.len() == 1 {
        let row = rows.into_iter().next().unwrap_or_default();
        return from_row(row).map(Denormalized::One);
    }

    rows.into_iter()
        .map(from_row)
        .collect::<ChormResult<Vec<_>>>()
        .map(Denormalized::Many)
}

fn index_by_id<E: Entity>(items: &[E]) -> ChormResult<Vec<(EntityId, &E)>> {
    let mut indexed: Vec<(EntityId, &E)> = Vec::with_capacity(items.len());
    for item in items {
        let Some(id) = item.id() else {
            return Err(ChormError::bad_request(format!(
                "unable to diff `{}` without an identifier.",
                E::entity_name()
            )));
        };
        match indexed.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = item,
            None => indexed.push((id, item)),
        }
    }
    Ok(indexed)
}

/// Field-level changes of `new_items` against `current_items`, keyed by id.
///
/// A field is reported when its key is missing from the current row or its
/// value differs. Items with no current counterpart report every column.
/// Ids appear in the order of `new_items`; ids with no changes map to an
/// empty row.
pub fn diff<E: Entity>(new_items: &[E], current_items: &[E]) -> ChormResult<Vec<(EntityId, Row)>> {
    let mut current: HashMap<EntityId, Row> = HashMap::with_capacity(current_items.len());
    for item in current_items {
        if let Some(id) = item.id() {
            current.insert(id, normalize_one(item)?);
        }
    }

    let mut out = Vec::new();
    for (id, item) in index_by_id(new_items)? {
        let row = normalize_one(item)?;
        let changed = match current.get(&id) {
            Some(existing) => row
                .into_iter()
                .filter(|(k, v)| existing.get(k) != Some(v))
                .collect(),
            None => row,
        };
        out.push((id, changed));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Metric {
        id: i64,
        name: String,
        value: f64,
    }

    impl Entity for Metric {
        fn columns() -> &'static [&'static str] {
            &["id", "name", "value"]
        }

        fn id(&self) -> Option<EntityId> {
            Some(EntityId::Int(self.id))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Partial {
        id: i64,
    }

    impl Entity for Partial {
        fn columns() -> &'static [&'static str] {
            &["id", "missing"]
        }

        fn id(&self) -> Option<EntityId> {
            Some(EntityId::Int(self.id))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(transparent)]
    struct Scalar(String);

    impl Entity for Scalar {
        fn columns() -> &'static [&'static str] {
            &["id"]
        }

        fn id(&self) -> Option<EntityId> {
            None
        }
    }

    fn metric(id: i64, name: &str, value: f64) -> Metric {
        Metric {
            id,
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn normalize_empty_is_bad_request() {
        let err = normalize::<Metric>(&[]).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn normalize_non_map_is_normalization_error() {
        let err = normalize(&[Scalar("x".into())]).unwrap_err();
        assert!(err.is_normalization());
    }

    #[test]
    fn normalize_missing_column_is_mapping_error() {
        let err = normalize(&[Partial { id: 1 }]).unwrap_err();
        assert!(err.is_mapping());
        assert!(err.to_string().contains("`Partial`"));
        assert!(err.to_string().contains("`missing`"));
    }

    #[test]
    fn normalize_keeps_declared_columns_only() {
        let rows = normalize(&[metric(1, "cpu", 0.5)]).unwrap();
        assert_eq!(
            serde_json::Value::Object(rows[0].clone()),
            json!({"id": 1, "name": "cpu", "value": 0.5})
        );
    }

    #[test]
    fn round_trip_reconstructs_entity() {
        let e = metric(3, "mem", 12.0);
        let rows = normalize(std::slice::from_ref(&e)).unwrap();
        assert_eq!(denormalize::<Metric>(rows).unwrap(), Denormalized::One(e));
    }

    #[test]
    fn denormalize_many_keeps_row_order() {
        let rows = normalize(&[metric(2, "b", 1.0), metric(1, "a", 2.0)]).unwrap();
        let out = denormalize::<Metric>(rows).unwrap().into_vec();
        assert_eq!(out.iter().map(|m| m.id).collect::<Vec<_>>(), [2, 1]);
        assert_eq!(denormalize::<Metric>(vec![]).unwrap(), Denormalized::Many(vec![]));
    }

    #[test]
    fn denormalize_mismatch_is_wrapped() {
        let row = json!({"id": "not a number", "name": "x", "value": 1.0});
        let serde_json::Value::Object(row) = row else { unreachable!() };
        let err = denormalize::<Metric>(vec![row]).unwrap_err();
        assert!(err.is_denormalization());
    }

    #[test]
    fn diff_against_self_is_empty() {
        let items = vec![metric(1, "a", 1.0), metric(2, "b", 2.0)];
        let d = diff(&items, &items).unwrap();
        assert_eq!(d.len(), 2);
        assert!(d.iter().all(|(_, row)| row.is_empty()));
    }

    #[test]
    fn diff_reports_changed_fields_only() {
        let d = diff(&[metric(1, "a", 9.0)], &[metric(1, "a", 1.0)]).unwrap();
        assert_eq!(d[0].0, EntityId::Int(1));
        assert_eq!(serde_json::Value::Object(d[0].1.clone()), json!({"value": 9.0}));
    }

    #[test]
    fn diff_of_unknown_id_is_full_row() {
        let d = diff(&[metric(5, "new", 1.0)], &[metric(1, "a", 1.0)]).unwrap();
        assert_eq!(d[0].1.len(), 3);
    }
}
