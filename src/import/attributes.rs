//! Attribute code to attribute id lookup

use std::collections::HashMap;

use crate::database::RelationalStore;
use crate::error::{ImportError, ImportResult};

/// Column holding the attribute code
pub const ATTRIBUTE_CODE_COLUMN: &str = "attribute_code";
/// Column holding the numeric attribute id
pub const ATTRIBUTE_ID_COLUMN: &str = "attribute_id";
/// Column scoping attributes to an entity type
pub const ENTITY_TYPE_COLUMN: &str = "entity_type_id";

/// Read-only `code -> id` snapshot for one entity type, taken once per run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRegistry {
    entity_type_id: i64,
    ids: HashMap<String, i64>,
}

impl AttributeRegistry {
    /// Load every attribute of `entity_type_id` from `table`
    pub async fn load<S: RelationalStore + ?Sized>(
        store: &S,
        table: &str,
        entity_type_id: i64,
    ) -> ImportResult<Self> {
        let scope = entity_type_id.to_string();
        let pairs = store
            .select_pairs(
                table,
                ATTRIBUTE_CODE_COLUMN,
                ATTRIBUTE_ID_COLUMN,
                Some((ENTITY_TYPE_COLUMN, scope.as_str())),
            )
            .await
            .map_err(ImportError::Attributes)?;

        let mut ids = HashMap::with_capacity(pairs.len());
        for (code, value) in pairs {
            let id = value
                .trim()
                .parse::<i64>()
                .map_err(|_| ImportError::InvalidAttributeId {
                    code: code.clone(),
                    value: value.clone(),
                })?;
            ids.insert(code, id);
        }

        tracing::debug!(
            entity_type_id,
            attributes = ids.len(),
            "Loaded attribute registry"
        );
        Ok(Self {
            entity_type_id,
            ids,
        })
    }

    /// Build a registry from known pairs
    pub fn from_pairs<I, S>(entity_type_id: i64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            entity_type_id,
            ids: pairs.into_iter().map(|(code, id)| (code.into(), id)).collect(),
        }
    }

    pub fn resolve(&self, code: &str) -> Option<i64> {
        self.ids.get(code).copied()
    }

    pub fn entity_type_id(&self) -> i64 {
        self.entity_type_id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
