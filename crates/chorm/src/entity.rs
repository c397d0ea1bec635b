//! Entity metadata.

use crate::error::{ChormError, ChormResult};
use crate::value::EntityId;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed record stored in a ClickHouse table.
///
/// Metadata is supplied statically: the declared column set drives
/// normalization and inserts, and the table name defaults to the type's short
/// name lower-cased (`app::model::PageView` maps to `pageview`).
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Event {
///     id: Option<String>,
///     status: String,
/// }
///
/// impl Entity for Event {
///     fn columns() -> &'static [&'static str] {
///         &["id", "status"]
///     }
///
///     fn id(&self) -> Option<EntityId> {
///         self.id.clone().map(EntityId::Str)
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Columns persisted for this entity, in table order.
    fn columns() -> &'static [&'static str];

    /// Identifier, `None` before the first insert.
    fn id(&self) -> Option<EntityId>;

    /// Short type name used in diagnostics.
    fn entity_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Table backing this entity.
    fn table_name() -> String {
        Self::entity_name().to_lowercase()
    }
}

/// Strip module path and generic arguments from a type name.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Resolve the table name for `E`, rejecting types without usable metadata.
pub fn resolve_table<E: Entity>() -> ChormResult<String> {
    let table = E::table_name();
    if table.trim().is_empty() {
        return Err(ChormError::EntityNotFound(format!(
            "target class `{}` not found.",
            std::any::type_name::<E>()
        )));
    }
    if E::columns().is_empty() {
        return Err(ChormError::EntityNotFound(format!(
            "entity `{}` declares no columns.",
            E::entity_name()
        )));
    }
    Ok(table)
}
